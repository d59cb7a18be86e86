//! Notification collaborator.
//!
//! The workflow only needs `dispatch(recipient, subject, content)`; email
//! transport lives outside this crate. Dispatch failures are reported to the
//! caller and never undo a committed transition.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a notification was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// New linkage awaiting the department coordinator.
    Submitted,
    /// Department approved (or resubmitted); awaiting the administrator.
    AwaitingAdmin,
    /// Administrator bounced the linkage back to the department.
    ReturnedToDepartment,
    /// Final approval; the receiving side should act.
    Approved,
}

/// A rendered message ready for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub case_id: String,
    pub linkage_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Transient, worth retrying.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Something that can deliver a notification.
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the message was not delivered.
    fn dispatch(&self, message: &Notification) -> Result<(), DispatchError>;
}

/// Bounded retry for rate-limited dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each further one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; no delay before the first.
        match attempt {
            0 | 1 => Duration::ZERO,
            n => self.backoff.saturating_mul(1u32 << (n - 2).min(16)),
        }
    }
}

/// Dispatch with retry on [`DispatchError::RateLimited`]. Other failures
/// are returned immediately.
///
/// # Errors
///
/// Returns the last [`DispatchError`] once attempts are exhausted.
pub fn dispatch_with_retry(
    notifier: &dyn Notifier,
    message: &Notification,
    policy: RetryPolicy,
) -> Result<(), DispatchError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        std::thread::sleep(policy.delay_before(attempt));
        match notifier.dispatch(message) {
            Ok(()) => {
                debug!(recipient = %message.recipient, attempt, "notification dispatched");
                return Ok(());
            }
            Err(DispatchError::RateLimited(reason)) if attempt < attempts => {
                warn!(recipient = %message.recipient, attempt, %reason, "dispatch rate limited, retrying");
                attempt += 1;
            }
            Err(e) => {
                warn!(recipient = %message.recipient, attempt, error = %e, "dispatch failed");
                return Err(e);
            }
        }
    }
}

/// Appends each message as one JSON line to an outbox file, for a separate
/// mail relay to pick up.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every message in the outbox.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read. Lines
    /// that fail to parse are skipped.
    pub fn read_all(&self) -> std::io::Result<Vec<Notification>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl Notifier for OutboxNotifier {
    fn dispatch(&self, message: &Notification) -> Result<(), DispatchError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| DispatchError::Transport(e.to_string()))?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}
