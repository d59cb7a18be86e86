//! Error types for welnav.

use thiserror::Error;

/// Top-level result type for welnav operations.
pub type Result<T> = std::result::Result<T, WelnavError>;

/// Top-level error type for welnav.
#[derive(Debug, Error)]
pub enum WelnavError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl WelnavError {
    /// Shorthand for a missing case.
    pub fn case_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "case",
            id: id.into(),
        }
    }

    /// Shorthand for a missing linkage.
    pub fn linkage_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "linkage",
            id: id.into(),
        }
    }

    /// True when the error means "already processed" rather than "missing".
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Transition(_))
    }
}

/// A state-changing operation whose precondition state did not hold.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid state for '{action}': linkage is {current}, expected {expected}")]
    InvalidState {
        action: String,
        current: String,
        expected: String,
    },

    #[error("case status cannot move from {from} to {to}")]
    NotForward { from: String, to: String },

    #[error("execution status cannot move from {from} to {to}")]
    InvalidExecution { from: String, to: String },

    #[error("execution status is only settable after final approval (linkage is {current})")]
    NotApproved { current: String },
}

/// Input rejected before any store mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown department '{0}'")]
    UnknownDepartment(String),

    #[error("source and target department are the same ('{0}')")]
    SameDepartment(String),
}
