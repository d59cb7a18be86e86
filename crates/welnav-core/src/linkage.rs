//! # Linkage approval state machine
//!
//! A linkage is a proposed referral or inter-department collaboration on a
//! case. It moves through a two-stage approval:
//!
//! ```text
//! pending ──▶ dept_approved ──▶ approved
//!    │              │  ▲
//!    │              │  └── dept_resubmitted ──┐
//!    │              ├──▶ admin_rejected ──────┤
//!    │              └──▶ admin_revision_requested
//!    ├──▶ rejected
//!    └──▶ revision_requested
//! ```
//!
//! Every transition is a guarded compare-and-set on `approval_status` and
//! appends exactly one [`ApprovalEntry`]. The operational
//! [`ExecutionStatus`] is a separate axis that only opens up once the
//! linkage is `approved`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::department;
use crate::error::{TransitionError, ValidationError};

// === Category & type ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageCategory {
    Referral,
    Collaboration,
}

impl LinkageCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Referral => "referral",
            Self::Collaboration => "collaboration",
        }
    }
}

impl std::fmt::Display for LinkageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageType {
    Consultation,
    Joint,
    Transfer,
    ServiceReferral,
}

impl LinkageType {
    /// The category this type belongs to.
    #[must_use]
    pub fn category(self) -> LinkageCategory {
        match self {
            Self::ServiceReferral => LinkageCategory::Referral,
            Self::Consultation | Self::Joint | Self::Transfer => LinkageCategory::Collaboration,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consultation => "consultation",
            Self::Joint => "joint",
            Self::Transfer => "transfer",
            Self::ServiceReferral => "service_referral",
        }
    }

    /// Korean label used in notifications.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Consultation => "자문 요청",
            Self::Joint => "공동 사례관리",
            Self::Transfer => "사례 이관",
            Self::ServiceReferral => "서비스 의뢰",
        }
    }
}

impl std::str::FromStr for LinkageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consultation" => Ok(Self::Consultation),
            "joint" => Ok(Self::Joint),
            "transfer" => Ok(Self::Transfer),
            "service_referral" => Ok(Self::ServiceReferral),
            other => Err(format!("unknown linkage type '{other}'")),
        }
    }
}

// === Status axes ===

/// Workflow state of a linkage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    DeptApproved,
    Approved,
    Rejected,
    RevisionRequested,
    AdminRejected,
    AdminRevisionRequested,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 7] = [
        Self::Pending,
        Self::DeptApproved,
        Self::Approved,
        Self::Rejected,
        Self::RevisionRequested,
        Self::AdminRejected,
        Self::AdminRevisionRequested,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DeptApproved => "dept_approved",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RevisionRequested => "revision_requested",
            Self::AdminRejected => "admin_rejected",
            Self::AdminRevisionRequested => "admin_revision_requested",
        }
    }

    /// Bounced back to the department by the administrator.
    #[must_use]
    pub fn is_returned(self) -> bool {
        matches!(self, Self::AdminRejected | Self::AdminRevisionRequested)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational state after final approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    EmailSent,
    EmailFailed,
    InProgress,
    Completed,
    Declined,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailSent => "email_sent",
            Self::EmailFailed => "email_failed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Declined => "declined",
        }
    }

    /// Edges reachable through the operational-status endpoint.
    #[must_use]
    pub fn can_advance_to(self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::EmailSent | Self::EmailFailed, Self::InProgress)
                | (Self::InProgress, Self::Completed | Self::Declined)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_sent" => Ok(Self::EmailSent),
            "email_failed" => Ok(Self::EmailFailed),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown execution status '{other}'")),
        }
    }
}

// === Actions & roles ===

/// Who performed a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    CaseHandler,
    DepartmentCoordinator,
    Administrator,
}

impl ApproverRole {
    /// Role label stored in the approval history.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::CaseHandler => "사례담당자",
            Self::DepartmentCoordinator => "부서 코디네이터",
            Self::Administrator => "관리자",
        }
    }
}

/// A transition on the approval state machine, named for what it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageAction {
    Submitted,
    DeptApproved,
    Rejected,
    RevisionRequested,
    Approved,
    AdminRejected,
    AdminRevisionRequested,
    DeptResubmitted,
}

impl LinkageAction {
    /// Actions that can be applied to an existing linkage.
    pub const TRANSITIONS: [LinkageAction; 7] = [
        Self::DeptApproved,
        Self::Rejected,
        Self::RevisionRequested,
        Self::Approved,
        Self::AdminRejected,
        Self::AdminRevisionRequested,
        Self::DeptResubmitted,
    ];

    /// States from which this action is legal. Empty for `Submitted`, which
    /// only happens at creation.
    #[must_use]
    pub fn preconditions(self) -> &'static [ApprovalStatus] {
        use ApprovalStatus as S;
        match self {
            Self::Submitted => &[],
            Self::DeptApproved | Self::Rejected | Self::RevisionRequested => &[S::Pending],
            Self::Approved | Self::AdminRejected | Self::AdminRevisionRequested => {
                &[S::DeptApproved]
            }
            Self::DeptResubmitted => &[S::AdminRejected, S::AdminRevisionRequested],
        }
    }

    /// State reached after this action.
    #[must_use]
    pub fn target(self) -> ApprovalStatus {
        use ApprovalStatus as S;
        match self {
            Self::Submitted => S::Pending,
            Self::DeptApproved | Self::DeptResubmitted => S::DeptApproved,
            Self::Rejected => S::Rejected,
            Self::RevisionRequested => S::RevisionRequested,
            Self::Approved => S::Approved,
            Self::AdminRejected => S::AdminRejected,
            Self::AdminRevisionRequested => S::AdminRevisionRequested,
        }
    }

    /// Role that performs this action.
    #[must_use]
    pub fn role(self) -> ApproverRole {
        match self {
            Self::Submitted => ApproverRole::CaseHandler,
            Self::DeptApproved
            | Self::Rejected
            | Self::RevisionRequested
            | Self::DeptResubmitted => ApproverRole::DepartmentCoordinator,
            Self::Approved | Self::AdminRejected | Self::AdminRevisionRequested => {
                ApproverRole::Administrator
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::DeptApproved => "dept_approved",
            Self::Rejected => "rejected",
            Self::RevisionRequested => "revision_requested",
            Self::Approved => "approved",
            Self::AdminRejected => "admin_rejected",
            Self::AdminRevisionRequested => "admin_revision_requested",
            Self::DeptResubmitted => "dept_resubmitted",
        }
    }
}

impl std::fmt::Display for LinkageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Records ===

/// One entry of the append-only approval history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub action: LinkageAction,
    /// Role label of the actor.
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

/// Free-form discussion note on a linkage, independent of approval history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkageNote {
    pub author: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Input for creating a linkage.
#[derive(Debug, Clone, Default)]
pub struct LinkageDraft {
    pub kind: Option<LinkageType>,
    pub from_dept: Option<String>,
    pub to_dept: Option<String>,
    pub target_service: Option<String>,
    pub reason: String,
    pub sequence: Option<u32>,
    pub depends_on: Option<String>,
}

/// A proposed referral or collaboration, owned by its parent case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linkage {
    pub id: String,
    pub category: LinkageCategory,
    #[serde(rename = "type")]
    pub kind: LinkageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_dept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_dept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service: Option<String>,
    pub reason: String,

    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub execution_status: Option<ExecutionStatus>,
    #[serde(default)]
    pub approval_history: Vec<ApprovalEntry>,
    #[serde(default)]
    pub notes: Vec<LinkageNote>,

    /// Case spawned once a referral is realized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_request_id: Option<String>,

    // === Multi-step sequencing hints ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,

    /// Marker left by the legacy migration, e.g. `collaboration:<id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Linkage {
    /// Validate a draft and create a pending linkage with its `submitted`
    /// history entry.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the reason is blank, the type is
    /// missing, a referral lacks a target service, or a collaboration has
    /// missing, unknown, or identical departments.
    pub fn submit(
        draft: LinkageDraft,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let kind = draft.kind.ok_or(ValidationError::MissingField("type"))?;
        let reason = draft.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ValidationError::MissingField("reason"));
        }
        let category = kind.category();

        let (from_dept, to_dept, target_service) = match category {
            LinkageCategory::Collaboration => {
                let from = non_blank(draft.from_dept).ok_or(ValidationError::MissingField("fromDept"))?;
                let to = non_blank(draft.to_dept).ok_or(ValidationError::MissingField("toDept"))?;
                for dept in [&from, &to] {
                    if department::find(dept).is_none() {
                        return Err(ValidationError::UnknownDepartment(dept.clone()));
                    }
                }
                if from == to {
                    return Err(ValidationError::SameDepartment(from));
                }
                (Some(from), Some(to), None)
            }
            LinkageCategory::Referral => {
                let target = non_blank(draft.target_service)
                    .ok_or(ValidationError::MissingField("targetService"))?;
                (None, None, Some(target))
            }
        };

        let mut linkage = Self {
            id: new_linkage_id(),
            category,
            kind,
            from_dept,
            to_dept,
            target_service,
            reason,
            approval_status: ApprovalStatus::Pending,
            execution_status: None,
            approval_history: Vec::new(),
            notes: Vec::new(),
            new_request_id: None,
            sequence: draft.sequence,
            depends_on: draft.depends_on,
            migrated_from: None,
            created_at: at,
            updated_at: at,
        };
        linkage.record(LinkageAction::Submitted, comment, at);
        Ok(linkage)
    }

    /// Apply an approval action if the current state matches its precondition.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::InvalidState`] without mutating anything
    /// when the linkage is not in a state the action accepts.
    pub fn apply(
        &mut self,
        action: LinkageAction,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let allowed = action.preconditions();
        if !allowed.contains(&self.approval_status) {
            return Err(TransitionError::InvalidState {
                action: action.to_string(),
                current: self.approval_status.to_string(),
                expected: allowed
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("|"),
            });
        }
        self.approval_status = action.target();
        self.record(action, comment, at);
        Ok(())
    }

    /// Record the outcome of the final-approval notification.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::NotApproved`] unless the linkage is approved.
    pub fn record_dispatch(&mut self, delivered: bool, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require_approved()?;
        self.execution_status = Some(if delivered {
            ExecutionStatus::EmailSent
        } else {
            ExecutionStatus::EmailFailed
        });
        self.updated_at = at;
        Ok(())
    }

    /// Advance the operational status (post-approval endpoint).
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::NotApproved`] before final approval and
    /// [`TransitionError::InvalidExecution`] for edges outside
    /// `email_sent|email_failed → in_progress → completed|declined`.
    pub fn advance_execution(
        &mut self,
        next: ExecutionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.require_approved()?;
        let current = self.execution_status;
        if !current.is_some_and(|c| c.can_advance_to(next)) {
            return Err(TransitionError::InvalidExecution {
                from: current.map_or("none", ExecutionStatus::as_str).to_string(),
                to: next.to_string(),
            });
        }
        self.execution_status = Some(next);
        self.updated_at = at;
        Ok(())
    }

    pub fn add_note(&mut self, author: impl Into<String>, text: impl Into<String>, at: DateTime<Utc>) {
        self.notes.push(LinkageNote {
            author: author.into(),
            text: text.into(),
            at,
        });
        self.updated_at = at;
    }

    fn require_approved(&self) -> Result<(), TransitionError> {
        if self.approval_status != ApprovalStatus::Approved {
            return Err(TransitionError::NotApproved {
                current: self.approval_status.to_string(),
            });
        }
        Ok(())
    }

    fn record(&mut self, action: LinkageAction, comment: Option<String>, at: DateTime<Utc>) {
        self.approval_history.push(ApprovalEntry {
            action,
            by: action.role().label().to_string(),
            comment: non_blank(comment),
            at,
        });
        self.updated_at = at;
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Generate an opaque linkage id.
#[must_use]
pub fn new_linkage_id() -> String {
    format!("lnk-{}", Uuid::new_v4().simple())
}
