//! # welnav-store
//!
//! File-backed storage for case records.
//!
//! The store file is the authoritative source of truth. Writes are atomic
//! (temp file + rename) and preceded by a backup copy; a corrupt primary is
//! recovered from the backup, or quarantined under a timestamped name so
//! the process keeps running on an empty store.

pub mod migration;
pub mod store;

pub use migration::{migrate_case, MigrationReport};
pub use store::{CaseStore, Snapshot, BACKUP_FILE, STORE_FILE};
