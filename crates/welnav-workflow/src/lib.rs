//! # welnav-workflow
//!
//! Guarded operations over the case store:
//! - [`Workflow`]: application intake, forward-only case status, and the
//!   two-stage linkage approval with its side effects
//! - [`chain`]: cycle-safe referral lineage
//! - [`notify`]: notification collaborator with bounded retry
//! - [`views`]: dashboard queues and counters

pub mod chain;
pub mod notify;
pub mod render;
pub mod service;
pub mod summarize;
pub mod views;

pub use chain::{referral_chain, truncate_chain, ChainEntry};
pub use notify::{
    dispatch_with_retry, DispatchError, Notification, NotificationKind, Notifier, OutboxNotifier,
    RetryPolicy,
};
pub use service::{ApplicationInput, DispatchOutcome, Intake, TransitionOutcome, Workflow};
pub use summarize::{ExtractiveSummarizer, NoSummarizer, Summarizer};
pub use views::{DashboardStats, LinkageView};
