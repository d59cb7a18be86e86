//! File-backed case store.
//!
//! The whole collection lives in one JSON object keyed by case id. Every
//! mutation reads the current snapshot, applies the change and replaces the
//! file atomically (temp file in the same directory, then rename). A
//! best-effort copy of the previous file is kept as `cases.json.bak` and is
//! used to recover when the primary file fails to parse.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use welnav_core::case::{CaseNote, ReferralRecord};
use welnav_core::error::WelnavError;
use welnav_core::{Case, CaseStatus};

/// Primary store file name.
pub const STORE_FILE: &str = "cases.json";
/// Backup copy written before every replace.
pub const BACKUP_FILE: &str = "cases.json.bak";

/// The full case collection, keyed by id.
pub type Snapshot = BTreeMap<String, Case>;

/// Last parsed snapshot together with the modification time it was read at.
#[derive(Debug)]
struct CachedSnapshot {
    modified: SystemTime,
    cases: Snapshot,
}

/// Durable keyed storage of case records.
///
/// The store is a dumb persistence layer: it does not enforce lifecycle
/// rules. Concurrent writers racing on the same file get last-write-wins on
/// the whole collection.
#[derive(Debug)]
pub struct CaseStore {
    dir: PathBuf,
    cache: Mutex<Option<CachedSnapshot>>,
}

impl CaseStore {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`WelnavError::Io`] if the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self, WelnavError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            cache: Mutex::new(None),
        })
    }

    /// Path of the primary store file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    /// Path of the backup copy.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    /// Directory the store lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // === Reads ===

    /// Load the current snapshot, recovering from corruption if needed.
    ///
    /// # Errors
    ///
    /// Returns an error only when the filesystem itself fails; unparsable
    /// content is recovered from backup or quarantined.
    pub fn load(&self) -> Result<Snapshot, WelnavError> {
        let path = self.path();
        let modified = match fs::metadata(&path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::new()),
            Err(e) => return Err(e.into()),
        };

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref() {
                if cached.modified == modified {
                    return Ok(cached.cases.clone());
                }
            }
        }

        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(cases) => {
                debug!(count = cases.len(), "loaded case store");
                *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedSnapshot {
                    modified,
                    cases: cases.clone(),
                });
                Ok(cases)
            }
            Err(parse_err) => {
                warn!(error = %parse_err, path = %path.display(), "case store is corrupt");
                self.recover()
            }
        }
    }

    /// Return a case by id, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Propagates [`CaseStore::load`] failures.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Case>, WelnavError> {
        Ok(self.load()?.remove(id))
    }

    /// Every case, newest first by authoritative timestamp.
    ///
    /// # Errors
    ///
    /// Propagates [`CaseStore::load`] failures.
    pub fn list_all(&self) -> Result<Vec<Case>, WelnavError> {
        let mut cases: Vec<Case> = self.load()?.into_values().collect();
        cases.sort_by_key(|c| std::cmp::Reverse(c.ordering_key()));
        Ok(cases)
    }

    // === Writes ===

    /// Insert or fully replace a case under its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or written.
    pub fn save(&self, case: Case) -> Result<Case, WelnavError> {
        self.transact(|cases| {
            cases.insert(case.id.clone(), case.clone());
            Ok(case)
        })
    }

    /// Set a case's status unconditionally and bump its update timestamp.
    ///
    /// Lifecycle ordering is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or written.
    pub fn update_status(&self, id: &str, status: CaseStatus) -> Result<Option<Case>, WelnavError> {
        self.modify(id, |case| {
            case.status = status;
            case.touch(Utc::now());
            Ok(())
        })
        .map(|found| found.map(|(case, ())| case))
    }

    /// Append a note to a case.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or written.
    pub fn add_note(&self, id: &str, author: &str, text: &str) -> Result<Option<Case>, WelnavError> {
        self.modify(id, |case| {
            let now = Utc::now();
            case.notes.push(CaseNote {
                author: author.to_string(),
                text: text.to_string(),
                at: now,
            });
            case.touch(now);
            Ok(())
        })
        .map(|found| found.map(|(case, ())| case))
    }

    /// Append a forward referral record to a case.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or written.
    pub fn add_referral(
        &self,
        id: &str,
        record: ReferralRecord,
    ) -> Result<Option<Case>, WelnavError> {
        self.modify(id, |case| {
            case.touch(record.referred_at.unwrap_or_else(Utc::now));
            case.referrals.push(record);
            Ok(())
        })
        .map(|found| found.map(|(case, ())| case))
    }

    /// Read-modify-write a single case. Returns `None` if the id is absent.
    /// Nothing is written when `f` fails.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from persistence.
    pub fn modify<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Case) -> Result<R, WelnavError>,
    ) -> Result<Option<(Case, R)>, WelnavError> {
        let mut cases = self.load()?;
        let Some(case) = cases.get_mut(id) else {
            return Ok(None);
        };
        let out = f(case)?;
        let updated = case.clone();
        self.write_snapshot(&cases, true)?;
        Ok(Some((updated, out)))
    }

    /// Read-modify-write the whole collection in one atomic replace.
    /// Nothing is written when `f` fails.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from persistence.
    pub fn transact<R>(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<R, WelnavError>,
    ) -> Result<R, WelnavError> {
        let mut cases = self.load()?;
        let out = f(&mut cases)?;
        self.write_snapshot(&cases, true)?;
        Ok(out)
    }

    // === Persistence ===

    fn write_snapshot(&self, cases: &Snapshot, with_backup: bool) -> Result<(), WelnavError> {
        let path = self.path();
        if with_backup && path.exists() {
            if let Err(e) = fs::copy(&path, self.backup_path()) {
                warn!(error = %e, "could not refresh case store backup");
            }
        }

        let body = serde_json::to_vec_pretty(cases)
            .map_err(|e| WelnavError::Serialization(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| WelnavError::Store(format!("atomic replace failed: {e}")))?;

        self.invalidate();
        debug!(count = cases.len(), "wrote case store");
        Ok(())
    }

    fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Primary failed to parse: restore from backup, or quarantine and start empty.
    fn recover(&self) -> Result<Snapshot, WelnavError> {
        self.invalidate();
        let backup = self.backup_path();
        let from_backup = fs::read_to_string(&backup)
            .ok()
            .and_then(|raw| serde_json::from_str::<Snapshot>(&raw).ok());

        if let Some(cases) = from_backup {
            info!(count = cases.len(), "recovered case store from backup");
            // The backup is the good copy; don't overwrite it with the corrupt primary.
            self.write_snapshot(&cases, false)?;
            return Ok(cases);
        }

        let quarantine = self.dir.join(format!(
            "cases.corrupt-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));
        fs::rename(self.path(), &quarantine)?;
        error!(
            preserved = %quarantine.display(),
            "case store and backup unreadable; starting empty"
        );
        Ok(Snapshot::new())
    }
}
