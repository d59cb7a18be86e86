//! The workflow service: every guarded operation on cases and linkages.
//!
//! The store is a dumb persistence layer; lifecycle rules live here. Each
//! state change is one store transaction, and notification dispatch runs
//! only after that transaction has committed, so a failed dispatch can
//! never undo a transition.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use welnav_core::case::{CaseNote, PlanStep, ReferralRecord};
use welnav_core::department;
use welnav_core::error::{Result, TransitionError, ValidationError, WelnavError};
use welnav_core::{
    Case, CaseStatus, ExecutionStatus, Linkage, LinkageAction, LinkageCategory, LinkageDraft,
    WelnavConfig,
};
use welnav_store::{CaseStore, Snapshot};

use crate::chain::{self, ChainEntry};
use crate::notify::{dispatch_with_retry, Notification, NotificationKind, Notifier, RetryPolicy};
use crate::render::render;
use crate::summarize::{NoSummarizer, Summarizer};
use crate::views::{self, DashboardStats, LinkageView};

/// A citizen's application, as accepted from the chat layer.
#[derive(Debug, Clone, Default)]
pub struct ApplicationInput {
    pub service: String,
    pub applicant_name: String,
    pub applicant_phone: String,
    pub assigned_department: Option<String>,
    /// First note on the case, e.g. the applicant's own words.
    pub note: Option<String>,
    /// Why the service was recommended.
    pub rationale: Option<String>,
}

/// Result of an intake. `duplicate_of` is advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intake {
    pub case: Case,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

/// What happened to the notification for a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub recipient: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of creating or transitioning a linkage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub case_id: String,
    pub linkage: Linkage,
    /// Case created by a realized referral.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawned_case: Option<Case>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchOutcome>,
}

/// Case and linkage workflow over a [`CaseStore`].
pub struct Workflow {
    store: CaseStore,
    notifier: Box<dyn Notifier>,
    summarizer: Box<dyn Summarizer>,
    config: WelnavConfig,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    #[must_use]
    pub fn new(store: CaseStore, notifier: Box<dyn Notifier>, config: WelnavConfig) -> Self {
        Self {
            store,
            notifier,
            summarizer: Box::new(NoSummarizer),
            config,
        }
    }

    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    #[must_use]
    pub fn store(&self) -> &CaseStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &WelnavConfig {
        &self.config
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.config.dispatch_attempts,
            backoff: Duration::from_millis(self.config.dispatch_backoff_ms),
        }
    }

    // === Cases ===

    /// Accept an application as a new `open` case.
    ///
    /// An existing case with the same applicant name, phone and service
    /// created inside the duplicate window is reported in
    /// [`Intake::duplicate_of`]; the new case is created regardless.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields or an unknown department,
    /// before anything is written.
    pub fn submit_application(
        &self,
        input: ApplicationInput,
        transcript: Option<&str>,
    ) -> Result<Intake> {
        let service = required(&input.service, "service")?;
        let name = required(&input.applicant_name, "applicantName")?;
        let phone = required(&input.applicant_phone, "applicantPhone")?;
        let assigned = input
            .assigned_department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(dept) = &assigned {
            known_department(dept)?;
        }

        let now = Utc::now();
        let mut case = Case::new(service, name, phone, now);
        case.assigned_department = assigned;
        case.ai_rationale = input.rationale.filter(|r| !r.trim().is_empty());
        case.ai_summary = transcript.and_then(|t| self.summarizer.summarize(t));
        if let Some(text) = input.note.filter(|n| !n.trim().is_empty()) {
            case.notes.push(CaseNote {
                author: "신청자".to_string(),
                text,
                at: now,
            });
        }

        let window = TimeDelta::try_minutes(self.config.duplicate_window_minutes.max(0))
            .unwrap_or(TimeDelta::zero());
        let since = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let intake = self.store.transact(|cases| {
            let duplicate_of = find_duplicate(cases, &case, since);
            cases.insert(case.id.clone(), case.clone());
            Ok(Intake {
                case: case.clone(),
                duplicate_of,
            })
        })?;

        if let Some(dup) = &intake.duplicate_of {
            warn!(case_id = %intake.case.id, duplicate_of = %dup, "possible duplicate application");
        }
        info!(case_id = %intake.case.id, service = %intake.case.service, "application accepted");
        Ok(intake)
    }

    /// Move a case forward in its lifecycle.
    ///
    /// # Errors
    ///
    /// [`WelnavError::NotFound`] for an unknown id, or
    /// [`TransitionError::NotForward`] (case unchanged) when `status` does
    /// not come strictly after the current one.
    pub fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<Case> {
        let (case, ()) = self
            .store
            .modify(case_id, |case| {
                if !case.status.can_advance_to(status) {
                    return Err(TransitionError::NotForward {
                        from: case.status.to_string(),
                        to: status.to_string(),
                    }
                    .into());
                }
                case.status = status;
                case.touch(Utc::now());
                Ok(())
            })?
            .ok_or_else(|| WelnavError::case_not_found(case_id))?;
        info!(case_id, status = %status, "case status advanced");
        Ok(case)
    }

    /// Append a note to a case.
    ///
    /// # Errors
    ///
    /// Validation error for blank text, [`WelnavError::NotFound`] for an
    /// unknown id.
    pub fn add_case_note(&self, case_id: &str, author: &str, text: &str) -> Result<Case> {
        let text = required(text, "text")?;
        let author = author.trim();
        let author = if author.is_empty() { "사례담당자" } else { author };
        self.store
            .add_note(case_id, author, &text)?
            .ok_or_else(|| WelnavError::case_not_found(case_id))
    }

    /// Replace a case's service plan.
    ///
    /// # Errors
    ///
    /// Validation error for a step with a blank title or unknown department,
    /// [`WelnavError::NotFound`] for an unknown id.
    pub fn set_service_plan(&self, case_id: &str, steps: Vec<PlanStep>) -> Result<Case> {
        for step in &steps {
            required(&step.title, "title")?;
            if let Some(dept) = &step.department {
                known_department(dept)?;
            }
        }
        self.store
            .modify(case_id, |case| {
                case.service_plan = Some(steps);
                case.touch(Utc::now());
                Ok(())
            })?
            .map(|(case, ())| case)
            .ok_or_else(|| WelnavError::case_not_found(case_id))
    }

    /// Set the department hint on a case.
    ///
    /// # Errors
    ///
    /// Validation error for an unknown department, [`WelnavError::NotFound`]
    /// for an unknown case.
    pub fn assign_department(&self, case_id: &str, dept: &str) -> Result<Case> {
        known_department(dept)?;
        self.store
            .modify(case_id, |case| {
                case.assigned_department = Some(dept.to_string());
                case.touch(Utc::now());
                Ok(())
            })?
            .map(|(case, ())| case)
            .ok_or_else(|| WelnavError::case_not_found(case_id))
    }

    // === Linkages ===

    /// Create a pending linkage on a case and notify the department side.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any write;
    /// [`WelnavError::NotFound`] for an unknown case.
    pub fn create_linkage(
        &self,
        case_id: &str,
        draft: LinkageDraft,
        comment: Option<String>,
    ) -> Result<TransitionOutcome> {
        let linkage = Linkage::submit(draft, comment, Utc::now())?;
        let (case, ()) = self
            .store
            .modify(case_id, |case| {
                case.touch(linkage.created_at);
                case.linkages.push(linkage.clone());
                Ok(())
            })?
            .ok_or_else(|| WelnavError::case_not_found(case_id))?;
        info!(
            case_id,
            linkage_id = %linkage.id,
            category = %linkage.category,
            "linkage submitted"
        );

        let recipient = self.department_side(&case, &linkage);
        let dispatch = self.notify(NotificationKind::Submitted, recipient, &case, &linkage, &[]);
        Ok(TransitionOutcome {
            case_id: case.id,
            linkage,
            spawned_case: None,
            dispatch: Some(dispatch),
        })
    }

    pub fn dept_approve(&self, linkage_id: &str, comment: Option<String>) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::DeptApproved, comment)
    }

    pub fn dept_reject(&self, linkage_id: &str, comment: Option<String>) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::Rejected, comment)
    }

    pub fn dept_request_revision(
        &self,
        linkage_id: &str,
        comment: Option<String>,
    ) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::RevisionRequested, comment)
    }

    pub fn admin_approve(&self, linkage_id: &str, comment: Option<String>) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::Approved, comment)
    }

    pub fn admin_reject(&self, linkage_id: &str, comment: Option<String>) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::AdminRejected, comment)
    }

    pub fn admin_request_revision(
        &self,
        linkage_id: &str,
        comment: Option<String>,
    ) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::AdminRevisionRequested, comment)
    }

    pub fn dept_resubmit(&self, linkage_id: &str, comment: Option<String>) -> Result<TransitionOutcome> {
        self.transition(linkage_id, LinkageAction::DeptResubmitted, comment)
    }

    /// Apply one approval action.
    ///
    /// Final approval of a referral spawns the referred case in the same
    /// transaction. The notification goes out after commit; for final
    /// approval its outcome sets `executionStatus` to `email_sent` or
    /// `email_failed`.
    ///
    /// # Errors
    ///
    /// [`WelnavError::NotFound`] for an unknown linkage, or
    /// [`TransitionError::InvalidState`] (nothing written) when the linkage
    /// is not in a state `action` accepts.
    pub fn transition(
        &self,
        linkage_id: &str,
        action: LinkageAction,
        comment: Option<String>,
    ) -> Result<TransitionOutcome> {
        let now = Utc::now();
        let (case, linkage, spawned) = self.store.transact(|cases| {
            let case_id =
                locate(cases, linkage_id).ok_or_else(|| WelnavError::linkage_not_found(linkage_id))?;
            let case = cases
                .get_mut(&case_id)
                .ok_or_else(|| WelnavError::case_not_found(&case_id))?;
            let linkage = case
                .linkage_mut(linkage_id)
                .ok_or_else(|| WelnavError::linkage_not_found(linkage_id))?;
            linkage.apply(action, comment, now)?;

            let realize = action == LinkageAction::Approved
                && linkage.category == LinkageCategory::Referral
                && linkage.new_request_id.is_none();
            let spawned = if realize {
                Some(realize_referral(case, linkage_id, now))
            } else {
                None
            };
            case.touch(now);

            let case = case.clone();
            let linkage = case
                .linkage(linkage_id)
                .cloned()
                .ok_or_else(|| WelnavError::linkage_not_found(linkage_id))?;
            if let Some(child) = &spawned {
                cases.insert(child.id.clone(), child.clone());
            }
            Ok((case, linkage, spawned))
        })?;

        info!(
            case_id = %case.id,
            linkage_id,
            action = %action,
            status = %linkage.approval_status,
            "linkage transition"
        );
        if let Some(child) = &spawned {
            info!(parent = %case.id, spawned = %child.id, "referral realized as new case");
        }

        let (kind, recipient) = match action {
            LinkageAction::DeptApproved | LinkageAction::DeptResubmitted => (
                NotificationKind::AwaitingAdmin,
                self.config.admin_recipient.clone(),
            ),
            LinkageAction::AdminRejected | LinkageAction::AdminRevisionRequested => (
                NotificationKind::ReturnedToDepartment,
                self.department_side(&case, &linkage),
            ),
            LinkageAction::Approved => (NotificationKind::Approved, self.receiving_side(&linkage)),
            LinkageAction::Submitted | LinkageAction::Rejected | LinkageAction::RevisionRequested => {
                return Ok(TransitionOutcome {
                    case_id: case.id,
                    linkage,
                    spawned_case: spawned,
                    dispatch: None,
                });
            }
        };

        let chain = if kind == NotificationKind::Approved {
            let snapshot = self.store.load()?;
            chain::referral_chain(&snapshot, &case.id)
        } else {
            Vec::new()
        };
        let window = chain::truncate_chain(&chain, self.config.max_chain_len);
        let dispatch = self.notify(kind, recipient, &case, &linkage, window);

        let linkage = if kind == NotificationKind::Approved {
            self.record_dispatch(linkage_id, dispatch.delivered)
                .unwrap_or(linkage)
        } else {
            linkage
        };

        Ok(TransitionOutcome {
            case_id: case.id,
            linkage,
            spawned_case: spawned,
            dispatch: Some(dispatch),
        })
    }

    /// Append a discussion note to a linkage.
    ///
    /// # Errors
    ///
    /// Validation error for blank text, [`WelnavError::NotFound`] for an
    /// unknown linkage.
    pub fn add_linkage_note(&self, linkage_id: &str, author: &str, text: &str) -> Result<Linkage> {
        let text = required(text, "text")?;
        let author = author.trim();
        let author = if author.is_empty() { "사례담당자" } else { author };
        self.with_linkage(linkage_id, |linkage, at| {
            linkage.add_note(author, text, at);
            Ok(())
        })
    }

    /// Advance the operational status of an approved linkage.
    ///
    /// # Errors
    ///
    /// [`TransitionError::NotApproved`] before final approval,
    /// [`TransitionError::InvalidExecution`] for an illegal edge,
    /// [`WelnavError::NotFound`] for an unknown linkage.
    pub fn update_execution_status(
        &self,
        linkage_id: &str,
        status: ExecutionStatus,
    ) -> Result<Linkage> {
        let linkage = self.with_linkage(linkage_id, |linkage, at| {
            linkage.advance_execution(status, at).map_err(WelnavError::from)
        })?;
        info!(linkage_id, status = %status, "execution status updated");
        Ok(linkage)
    }

    // === Reads ===

    /// Look up a linkage together with its case fields.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn find_linkage(&self, linkage_id: &str) -> Result<Option<LinkageView>> {
        let cases = self.store.load()?;
        Ok(views::linkages_where(&cases, |_| true)
            .into_iter()
            .find(|v| v.linkage.id == linkage_id))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn pending_for_department(&self) -> Result<Vec<LinkageView>> {
        Ok(views::pending_for_department(&self.store.load()?))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn pending_for_admin(&self) -> Result<Vec<LinkageView>> {
        Ok(views::pending_for_admin(&self.store.load()?))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn returned_to_department(&self) -> Result<Vec<LinkageView>> {
        Ok(views::returned_to_department(&self.store.load()?))
    }

    /// Full referral lineage of a case.
    ///
    /// # Errors
    ///
    /// [`WelnavError::NotFound`] for an unknown case.
    pub fn referral_chain(&self, case_id: &str) -> Result<Vec<ChainEntry>> {
        let cases = self.store.load()?;
        if !cases.contains_key(case_id) {
            return Err(WelnavError::case_not_found(case_id));
        }
        Ok(chain::referral_chain(&cases, case_id))
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn stats(&self) -> Result<DashboardStats> {
        Ok(views::stats(&self.store.load()?))
    }

    // === Internals ===

    fn with_linkage(
        &self,
        linkage_id: &str,
        f: impl FnOnce(&mut Linkage, DateTime<Utc>) -> Result<()>,
    ) -> Result<Linkage> {
        let now = Utc::now();
        self.store.transact(|cases| {
            let case_id =
                locate(cases, linkage_id).ok_or_else(|| WelnavError::linkage_not_found(linkage_id))?;
            let case = cases
                .get_mut(&case_id)
                .ok_or_else(|| WelnavError::case_not_found(&case_id))?;
            let linkage = case
                .linkage_mut(linkage_id)
                .ok_or_else(|| WelnavError::linkage_not_found(linkage_id))?;
            f(linkage, now)?;
            let out = linkage.clone();
            case.touch(now);
            Ok(out)
        })
    }

    fn record_dispatch(&self, linkage_id: &str, delivered: bool) -> Option<Linkage> {
        match self.with_linkage(linkage_id, |linkage, at| {
            linkage.record_dispatch(delivered, at).map_err(WelnavError::from)
        }) {
            Ok(linkage) => Some(linkage),
            Err(e) => {
                warn!(linkage_id, error = %e, "could not record dispatch outcome");
                None
            }
        }
    }

    fn notify(
        &self,
        kind: NotificationKind,
        recipient: String,
        case: &Case,
        linkage: &Linkage,
        chain: &[ChainEntry],
    ) -> DispatchOutcome {
        let rendered = render(kind, case, linkage, chain);
        let message = Notification {
            kind,
            recipient,
            subject: rendered.subject,
            body: rendered.body,
            case_id: case.id.clone(),
            linkage_id: linkage.id.clone(),
            created_at: Utc::now(),
        };
        match dispatch_with_retry(self.notifier.as_ref(), &message, self.retry_policy()) {
            Ok(()) => DispatchOutcome {
                recipient: message.recipient,
                delivered: true,
                error: None,
            },
            Err(e) => {
                warn!(
                    linkage_id = %linkage.id,
                    recipient = %message.recipient,
                    error = %e,
                    "notification not delivered"
                );
                DispatchOutcome {
                    recipient: message.recipient,
                    delivered: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Coordinator who owns the request: the requesting department for a
    /// collaboration, the case's assigned department for a referral.
    fn department_side(&self, case: &Case, linkage: &Linkage) -> String {
        let dept = match linkage.category {
            LinkageCategory::Collaboration => linkage.from_dept.as_deref(),
            LinkageCategory::Referral => case.assigned_department.as_deref(),
        };
        dept.map_or(self.config.admin_recipient.as_str(), |d| {
            self.config.department_recipient(d)
        })
        .to_string()
    }

    fn receiving_side(&self, linkage: &Linkage) -> String {
        match (linkage.category, linkage.to_dept.as_deref()) {
            (LinkageCategory::Collaboration, Some(to)) => {
                self.config.department_recipient(to).to_string()
            }
            _ => self.config.referral_recipient.clone(),
        }
    }
}

/// Spawn the referred case for an approved referral linkage on `parent`,
/// record the hop on the parent and link the linkage to the new case.
fn realize_referral(parent: &mut Case, linkage_id: &str, at: DateTime<Utc>) -> Case {
    let (target, reason) = parent
        .linkage(linkage_id)
        .map(|l| {
            (
                l.target_service.clone().unwrap_or_else(|| parent.service.clone()),
                l.reason.clone(),
            )
        })
        .unwrap_or_else(|| (parent.service.clone(), String::new()));

    let child = parent.spawn_referral(target.clone(), at);
    parent.referrals.push(ReferralRecord {
        target_service: target,
        reason,
        new_request_id: Some(child.id.clone()),
        linkage_id: Some(linkage_id.to_string()),
        referred_at: Some(at),
    });
    if let Some(linkage) = parent.linkage_mut(linkage_id) {
        linkage.new_request_id = Some(child.id.clone());
    }
    child
}

fn locate(cases: &Snapshot, linkage_id: &str) -> Option<String> {
    cases
        .values()
        .find(|c| c.linkage(linkage_id).is_some())
        .map(|c| c.id.clone())
}

fn find_duplicate(cases: &Snapshot, new: &Case, since: DateTime<Utc>) -> Option<String> {
    cases
        .values()
        .filter(|c| {
            c.applicant_name == new.applicant_name
                && c.applicant_phone == new.applicant_phone
                && c.service == new.service
                && c.ordering_key() >= since
        })
        .max_by_key(|c| c.ordering_key())
        .map(|c| c.id.clone())
}

fn required(value: &str, field: &'static str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field).into());
    }
    Ok(trimmed.to_string())
}

fn known_department(dept: &str) -> Result<()> {
    if department::find(dept).is_none() {
        return Err(ValidationError::UnknownDepartment(dept.to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use welnav_core::{ApprovalStatus, LinkageType};

    use crate::notify::DispatchError;
    use crate::summarize::ExtractiveSummarizer;

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<Notification>>>,
        fail: bool,
    }

    impl Notifier for Recorder {
        fn dispatch(&self, message: &Notification) -> std::result::Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::Transport("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.sent.lock().unwrap().iter().map(|n| n.kind).collect()
        }
    }

    fn config() -> WelnavConfig {
        let mut config = WelnavConfig {
            dispatch_backoff_ms: 1,
            ..WelnavConfig::default()
        };
        config
            .department_recipients
            .insert("care".to_string(), "care@example.org".to_string());
        config
            .department_recipients
            .insert("housing".to_string(), "housing@example.org".to_string());
        config
    }

    fn setup(fail: bool) -> (tempfile::TempDir, Workflow, Recorder) {
        let dir = tempfile::tempdir().unwrap();
        let store = CaseStore::open(dir.path()).unwrap();
        let recorder = Recorder {
            fail,
            ..Recorder::default()
        };
        let wf = Workflow::new(store, Box::new(recorder.clone()), config());
        (dir, wf, recorder)
    }

    fn apply(wf: &Workflow) -> Case {
        wf.submit_application(
            ApplicationInput {
                service: "노인맞춤돌봄서비스".to_string(),
                applicant_name: "이영희".to_string(),
                applicant_phone: "010-2222-3333".to_string(),
                assigned_department: Some("care".to_string()),
                ..ApplicationInput::default()
            },
            None,
        )
        .unwrap()
        .case
    }

    fn referral() -> LinkageDraft {
        LinkageDraft {
            kind: Some(LinkageType::ServiceReferral),
            target_service: Some("긴급돌봄지원사업".to_string()),
            reason: "급성 질환으로 긴급 돌봄 필요".to_string(),
            ..LinkageDraft::default()
        }
    }

    fn collaboration() -> LinkageDraft {
        LinkageDraft {
            kind: Some(LinkageType::Joint),
            from_dept: Some("care".to_string()),
            to_dept: Some("housing".to_string()),
            reason: "주거환경 개선 병행".to_string(),
            ..LinkageDraft::default()
        }
    }

    #[test]
    fn referral_approval_spawns_one_referred_case() {
        let (_dir, wf, recorder) = setup(false);
        let parent = apply(&wf);
        let created = wf.create_linkage(&parent.id, referral(), None).unwrap();
        let id = created.linkage.id.clone();

        wf.dept_approve(&id, Some("확인".into())).unwrap();
        let out = wf.admin_approve(&id, None).unwrap();

        let child = out.spawned_case.expect("referral spawns a case");
        assert_eq!(child.status, CaseStatus::Referred);
        assert_eq!(child.referred_from.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.service, "긴급돌봄지원사업");
        assert_eq!(child.applicant_name, parent.applicant_name);
        assert_eq!(out.linkage.execution_status, Some(ExecutionStatus::EmailSent));
        assert_eq!(out.linkage.new_request_id.as_deref(), Some(child.id.as_str()));

        let all = wf.store().list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all.iter().filter(|c| c.status == CaseStatus::Referred).count(),
            1
        );
        let stored_parent = wf.store().find_by_id(&parent.id).unwrap().unwrap();
        assert_eq!(stored_parent.referrals.len(), 1);
        assert_eq!(
            stored_parent.referrals[0].linkage_id.as_deref(),
            Some(id.as_str())
        );
        assert_eq!(
            stored_parent.linkage(&id).unwrap().execution_status,
            Some(ExecutionStatus::EmailSent)
        );

        assert_eq!(
            recorder.kinds(),
            vec![
                NotificationKind::Submitted,
                NotificationKind::AwaitingAdmin,
                NotificationKind::Approved
            ]
        );
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].recipient, "care@example.org");
        assert_eq!(sent[1].recipient, "admin@welnav.local");
        assert_eq!(sent[2].recipient, "referral@welnav.local");
        assert!(sent[2].body.contains("의뢰 이력"));
    }

    #[test]
    fn admin_approve_on_pending_fails_without_change() {
        let (_dir, wf, recorder) = setup(false);
        let case = apply(&wf);
        let id = wf
            .create_linkage(&case.id, referral(), None)
            .unwrap()
            .linkage
            .id;
        let before = wf.store().find_by_id(&case.id).unwrap().unwrap();

        let err = wf.admin_approve(&id, None).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(wf.store().find_by_id(&case.id).unwrap().unwrap(), before);
        assert_eq!(wf.store().list_all().unwrap().len(), 1);
        assert_eq!(recorder.kinds(), vec![NotificationKind::Submitted]);
    }

    #[test]
    fn unknown_ids_are_not_found_not_invalid_state() {
        let (_dir, wf, _) = setup(false);
        let err = wf.dept_approve("lnk-missing", None).unwrap_err();
        assert!(matches!(err, WelnavError::NotFound { kind: "linkage", .. }));
        assert!(!err.is_invalid_state());
        assert!(matches!(
            wf.update_case_status("req-missing", CaseStatus::Confirmed),
            Err(WelnavError::NotFound { kind: "case", .. })
        ));
        assert!(matches!(
            wf.referral_chain("req-missing"),
            Err(WelnavError::NotFound { .. })
        ));
    }

    #[test]
    fn dispatch_failure_keeps_approval() {
        let (_dir, wf, _) = setup(true);
        let case = apply(&wf);
        let created = wf.create_linkage(&case.id, collaboration(), None).unwrap();
        assert!(!created.dispatch.unwrap().delivered);
        let id = created.linkage.id;

        wf.dept_approve(&id, None).unwrap();
        let out = wf.admin_approve(&id, None).unwrap();
        assert_eq!(out.linkage.approval_status, ApprovalStatus::Approved);
        assert_eq!(out.linkage.execution_status, Some(ExecutionStatus::EmailFailed));
        assert!(out.spawned_case.is_none());
        let dispatch = out.dispatch.unwrap();
        assert!(!dispatch.delivered);
        assert_eq!(dispatch.recipient, "housing@example.org");

        let stored = wf.find_linkage(&id).unwrap().unwrap();
        assert_eq!(stored.linkage.approval_status, ApprovalStatus::Approved);
    }

    #[test]
    fn admin_bounce_and_resubmit_round_trip() {
        let (_dir, wf, recorder) = setup(false);
        let case = apply(&wf);
        let id = wf
            .create_linkage(&case.id, collaboration(), None)
            .unwrap()
            .linkage
            .id;
        wf.dept_approve(&id, None).unwrap();
        wf.admin_request_revision(&id, Some("서류 보완".into())).unwrap();
        assert_eq!(wf.returned_to_department().unwrap().len(), 1);
        assert!(wf.pending_for_admin().unwrap().is_empty());

        let out = wf.dept_resubmit(&id, Some("보완 완료".into())).unwrap();
        assert_eq!(out.linkage.approval_status, ApprovalStatus::DeptApproved);
        assert_eq!(out.linkage.approval_history.len(), 4);
        assert_eq!(wf.pending_for_admin().unwrap().len(), 1);
        assert_eq!(
            recorder.kinds(),
            vec![
                NotificationKind::Submitted,
                NotificationKind::AwaitingAdmin,
                NotificationKind::ReturnedToDepartment,
                NotificationKind::AwaitingAdmin
            ]
        );
    }

    #[test]
    fn department_rejection_is_silent_dead_end() {
        let (_dir, wf, recorder) = setup(false);
        let case = apply(&wf);
        let id = wf
            .create_linkage(&case.id, referral(), None)
            .unwrap()
            .linkage
            .id;
        let out = wf.dept_reject(&id, Some("대상 아님".into())).unwrap();
        assert!(out.dispatch.is_none());
        assert!(wf.dept_approve(&id, None).unwrap_err().is_invalid_state());
        assert!(wf.dept_resubmit(&id, None).unwrap_err().is_invalid_state());
        assert_eq!(recorder.kinds().len(), 1);
    }

    #[test]
    fn invalid_linkage_is_rejected_before_write() {
        let (_dir, wf, recorder) = setup(false);
        let case = apply(&wf);
        let mut draft = collaboration();
        draft.to_dept = Some("care".to_string());
        assert!(matches!(
            wf.create_linkage(&case.id, draft, None),
            Err(WelnavError::Validation(ValidationError::SameDepartment(_)))
        ));
        assert!(wf
            .store()
            .find_by_id(&case.id)
            .unwrap()
            .unwrap()
            .linkages
            .is_empty());
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn case_status_is_forward_only() {
        let (_dir, wf, _) = setup(false);
        let case = apply(&wf);
        wf.update_case_status(&case.id, CaseStatus::Contacted).unwrap();
        for back in [CaseStatus::Open, CaseStatus::Confirmed, CaseStatus::Contacted, CaseStatus::Referred] {
            let err = wf.update_case_status(&case.id, back).unwrap_err();
            assert!(matches!(
                err,
                WelnavError::Transition(TransitionError::NotForward { .. })
            ));
        }
        let stored = wf.store().find_by_id(&case.id).unwrap().unwrap();
        assert_eq!(stored.status, CaseStatus::Contacted);
        wf.update_case_status(&case.id, CaseStatus::Closed).unwrap();
        assert!(wf.update_case_status(&case.id, CaseStatus::Referred).is_err());
    }

    #[test]
    fn duplicate_application_is_advisory() {
        let (_dir, wf, _) = setup(false);
        let first = apply(&wf);
        let second = wf
            .submit_application(
                ApplicationInput {
                    service: "노인맞춤돌봄서비스".to_string(),
                    applicant_name: "이영희".to_string(),
                    applicant_phone: "010-2222-3333".to_string(),
                    ..ApplicationInput::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(second.duplicate_of.as_deref(), Some(first.id.as_str()));
        assert_ne!(second.case.id, first.id);
        assert_eq!(wf.store().list_all().unwrap().len(), 2);
    }

    #[test]
    fn oversized_duplicate_window_covers_all_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaseStore::open(dir.path()).unwrap();
        let config = WelnavConfig {
            duplicate_window_minutes: 1_000_000_000_000,
            ..config()
        };
        let wf = Workflow::new(store, Box::new(Recorder::default()), config);
        let first = apply(&wf);
        let second = wf
            .submit_application(
                ApplicationInput {
                    service: "노인맞춤돌봄서비스".to_string(),
                    applicant_name: "이영희".to_string(),
                    applicant_phone: "010-2222-3333".to_string(),
                    ..ApplicationInput::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(second.duplicate_of.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn application_validation_and_summary() {
        let (_dir, wf, _) = setup(false);
        assert!(matches!(
            wf.submit_application(ApplicationInput::default(), None),
            Err(WelnavError::Validation(ValidationError::MissingField("service")))
        ));

        let wf = wf.with_summarizer(Box::new(ExtractiveSummarizer::default()));
        let intake = wf
            .submit_application(
                ApplicationInput {
                    service: "주거급여".to_string(),
                    applicant_name: "박철수".to_string(),
                    applicant_phone: "010-1".to_string(),
                    note: Some("월세가 밀렸어요".to_string()),
                    ..ApplicationInput::default()
                },
                Some("user: 월세 지원이 필요해요\nassistant: 주거급여를 안내합니다"),
            )
            .unwrap();
        assert_eq!(intake.case.ai_summary.as_deref(), Some("월세 지원이 필요해요"));
        assert_eq!(intake.case.notes.len(), 1);
        assert!(intake.duplicate_of.is_none());
    }

    #[test]
    fn execution_status_only_after_approval() {
        let (_dir, wf, _) = setup(false);
        let case = apply(&wf);
        let id = wf
            .create_linkage(&case.id, collaboration(), None)
            .unwrap()
            .linkage
            .id;
        assert!(wf
            .update_execution_status(&id, ExecutionStatus::InProgress)
            .unwrap_err()
            .is_invalid_state());

        wf.dept_approve(&id, None).unwrap();
        wf.admin_approve(&id, None).unwrap();
        wf.update_execution_status(&id, ExecutionStatus::InProgress).unwrap();
        let done = wf
            .update_execution_status(&id, ExecutionStatus::Completed)
            .unwrap();
        assert_eq!(done.execution_status, Some(ExecutionStatus::Completed));
        assert!(wf
            .update_execution_status(&id, ExecutionStatus::InProgress)
            .is_err());
    }

    #[test]
    fn notes_plan_and_department() {
        let (_dir, wf, _) = setup(false);
        let case = apply(&wf);
        let id = wf
            .create_linkage(&case.id, referral(), None)
            .unwrap()
            .linkage
            .id;
        let l = wf.add_linkage_note(&id, "", "보호자 통화 완료").unwrap();
        assert_eq!(l.notes[0].author, "사례담당자");
        assert_eq!(l.approval_history.len(), 1);
        assert!(wf.add_linkage_note(&id, "a", "  ").is_err());

        let c = wf.add_case_note(&case.id, "상담사", "방문 예정").unwrap();
        assert_eq!(c.notes.len(), 1);

        let c = wf
            .set_service_plan(
                &case.id,
                vec![PlanStep {
                    title: "초기 상담".to_string(),
                    description: None,
                    department: Some("care".to_string()),
                    done: false,
                }],
            )
            .unwrap();
        assert_eq!(c.service_plan.map(|p| p.len()), Some(1));

        assert!(wf.assign_department(&case.id, "mars").is_err());
        let c = wf.assign_department(&case.id, "health").unwrap();
        assert_eq!(c.assigned_department.as_deref(), Some("health"));
    }

    #[test]
    fn chain_and_stats_after_referral() {
        let (_dir, wf, _) = setup(false);
        let parent = apply(&wf);
        let id = wf
            .create_linkage(&parent.id, referral(), None)
            .unwrap()
            .linkage
            .id;
        wf.dept_approve(&id, None).unwrap();
        let child = wf.admin_approve(&id, None).unwrap().spawned_case.unwrap();

        let chain = wf.referral_chain(&child.id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, parent.id);
        assert!(chain[1].is_current);

        let stats = wf.stats().unwrap();
        assert_eq!(stats.total_cases, 2);
        assert_eq!(stats.cases_by_status["referred"], 1);
        assert_eq!(stats.linkages_by_approval["approved"], 1);
    }

    fn arb_status() -> impl Strategy<Value = CaseStatus> {
        proptest::sample::select(CaseStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn rejected_status_updates_leave_case_unchanged(
            steps in proptest::collection::vec(arb_status(), 1..8),
        ) {
            let (_dir, wf, _) = setup(false);
            let case = apply(&wf);
            let mut current = CaseStatus::Open;
            for next in steps {
                match wf.update_case_status(&case.id, next) {
                    Ok(updated) => {
                        prop_assert!(current.can_advance_to(next));
                        prop_assert_eq!(updated.status, next);
                        current = next;
                    }
                    Err(err) => {
                        prop_assert!(!current.can_advance_to(next));
                        let is_not_forward = matches!(
                            err,
                            WelnavError::Transition(TransitionError::NotForward { .. })
                        );
                        prop_assert!(is_not_forward);
                    }
                }
                let stored = wf.store().find_by_id(&case.id).unwrap().unwrap();
                prop_assert_eq!(stored.status, current);
            }
        }
    }
}
