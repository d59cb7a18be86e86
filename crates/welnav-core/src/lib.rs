//! # welnav-core
//!
//! Core types for the welfare-navigation backend.
//!
//! This crate defines the foundational types used across all other welnav crates:
//! - [`Case`]: one citizen's service engagement, with its forward-only
//!   [`CaseStatus`]
//! - [`Linkage`]: a referral or collaboration under two-stage approval
//!   ([`ApprovalStatus`], [`ExecutionStatus`], [`LinkageAction`])
//! - [`Department`]: static coordinating-unit lookup table
//! - [`ServiceRecord`]: knowledge-base entry consumed by search
//! - [`WelnavConfig`]: runtime configuration
//! - Error hierarchy ([`WelnavError`], [`TransitionError`], [`ValidationError`])

pub mod case;
pub mod config;
pub mod department;
pub mod error;
pub mod linkage;
pub mod service;
pub mod temporal;

pub use case::{Case, CaseNote, CaseStatus, LegacyCollaboration, PlanStep, ReferralRecord};
pub use config::WelnavConfig;
pub use department::Department;
pub use error::{Result, TransitionError, ValidationError, WelnavError};
pub use linkage::{
    ApprovalEntry, ApprovalStatus, ApproverRole, ExecutionStatus, Linkage, LinkageAction,
    LinkageCategory, LinkageDraft, LinkageNote, LinkageType,
};
pub use service::ServiceRecord;
