//! One-time backfill of `linkages` from legacy `collaborations` and
//! `referrals`.
//!
//! Each migrated linkage carries a `migrated_from` marker
//! (`collaboration:<id>` or `referral:<index>`); elements whose marker is
//! already present are skipped, so running the migration again is a no-op.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use welnav_core::error::WelnavError;
use welnav_core::linkage::{new_linkage_id, ApprovalEntry};
use welnav_core::{
    ApprovalStatus, Case, ExecutionStatus, LegacyCollaboration, Linkage, LinkageAction,
    LinkageType,
};

use crate::store::CaseStore;

const MIGRATION_COMMENT: &str = "이전 데이터에서 이관됨";

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub cases_changed: usize,
    pub collaborations_migrated: usize,
    pub referrals_migrated: usize,
}

/// Backfill linkages on a single case. Returns `(collaborations, referrals)`
/// migrated by this call.
pub fn migrate_case(case: &mut Case, at: DateTime<Utc>) -> (usize, usize) {
    let mut seen: HashSet<String> = case
        .linkages
        .iter()
        .filter_map(|l| l.migrated_from.clone())
        .collect();

    let mut collaborations = 0;
    for legacy in &case.collaborations {
        let marker = format!("collaboration:{}", legacy.id);
        if !seen.insert(marker.clone()) {
            continue;
        }
        case.linkages.push(from_collaboration(legacy, marker, at));
        collaborations += 1;
    }

    let fallback = case.ordering_key();
    let mut referrals = 0;
    for (idx, record) in case.referrals.iter_mut().enumerate() {
        if record.linkage_id.is_some() {
            continue;
        }
        let marker = format!("referral:{idx}");
        if !seen.insert(marker.clone()) {
            continue;
        }
        let when = record.referred_at.unwrap_or(fallback);
        let mut linkage = migrated_shell(
            LinkageType::ServiceReferral,
            record.reason.clone(),
            marker,
            when,
        );
        linkage.target_service = Some(record.target_service.clone());
        linkage.new_request_id = record.new_request_id.clone();
        approve_migrated(&mut linkage, ExecutionStatus::EmailSent, when);
        record.linkage_id = Some(linkage.id.clone());
        case.linkages.push(linkage);
        referrals += 1;
    }

    if collaborations + referrals > 0 {
        case.touch(at);
    }
    (collaborations, referrals)
}

fn from_collaboration(legacy: &LegacyCollaboration, marker: String, at: DateTime<Utc>) -> Linkage {
    let kind = legacy.kind.parse().unwrap_or(LinkageType::Consultation);
    let when = legacy.created_at.unwrap_or(at);
    let mut linkage = migrated_shell(kind, legacy.reason.clone(), marker, when);
    linkage.from_dept = Some(legacy.from_dept.clone());
    linkage.to_dept = Some(legacy.to_dept.clone());

    let inherited = match legacy.status.as_str() {
        "accepted" => Some(ExecutionStatus::EmailSent),
        "in_progress" => Some(ExecutionStatus::InProgress),
        "completed" => Some(ExecutionStatus::Completed),
        "declined" => Some(ExecutionStatus::Declined),
        _ => None,
    };
    if let Some(execution) = inherited {
        approve_migrated(&mut linkage, execution, when);
    }
    linkage
}

fn migrated_shell(kind: LinkageType, reason: String, marker: String, at: DateTime<Utc>) -> Linkage {
    Linkage {
        id: new_linkage_id(),
        category: kind.category(),
        kind,
        from_dept: None,
        to_dept: None,
        target_service: None,
        reason,
        approval_status: ApprovalStatus::Pending,
        execution_status: None,
        approval_history: vec![history(LinkageAction::Submitted, at)],
        notes: Vec::new(),
        new_request_id: None,
        sequence: None,
        depends_on: None,
        migrated_from: Some(marker),
        created_at: at,
        updated_at: at,
    }
}

fn approve_migrated(linkage: &mut Linkage, execution: ExecutionStatus, at: DateTime<Utc>) {
    linkage.approval_status = ApprovalStatus::Approved;
    linkage.approval_history.push(history(LinkageAction::Approved, at));
    linkage.execution_status = Some(execution);
}

fn history(action: LinkageAction, at: DateTime<Utc>) -> ApprovalEntry {
    ApprovalEntry {
        action,
        by: action.role().label().to_string(),
        comment: Some(MIGRATION_COMMENT.to_string()),
        at,
    }
}

impl CaseStore {
    /// Run the legacy migration over every case in one atomic write.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or written.
    pub fn migrate_legacy(&self) -> Result<MigrationReport, WelnavError> {
        let now = Utc::now();
        let report = self.transact(|cases| {
            let mut report = MigrationReport::default();
            for case in cases.values_mut() {
                let (c, r) = migrate_case(case, now);
                if c + r > 0 {
                    report.cases_changed += 1;
                    report.collaborations_migrated += c;
                    report.referrals_migrated += r;
                }
            }
            Ok(report)
        })?;
        info!(
            cases = report.cases_changed,
            collaborations = report.collaborations_migrated,
            referrals = report.referrals_migrated,
            "legacy linkage migration finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use welnav_core::case::ReferralRecord;
    use welnav_core::LinkageCategory;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn legacy_case() -> Case {
        let mut case = Case::new("노인맞춤돌봄서비스", "이영희", "010-0000-1111", utc(2024, 5, 1));
        case.collaborations = vec![
            LegacyCollaboration {
                id: "col-1".to_string(),
                kind: "joint".to_string(),
                from_dept: "care".to_string(),
                to_dept: "housing".to_string(),
                reason: "주거환경 개선 병행".to_string(),
                status: "in_progress".to_string(),
                created_at: Some(utc(2024, 5, 2)),
            },
            LegacyCollaboration {
                id: "col-2".to_string(),
                kind: "mystery".to_string(),
                from_dept: "care".to_string(),
                to_dept: "health".to_string(),
                reason: "방문 건강관리".to_string(),
                status: "requested".to_string(),
                created_at: None,
            },
        ];
        case.referrals = vec![ReferralRecord {
            target_service: "긴급돌봄지원사업".to_string(),
            reason: "급성 질환".to_string(),
            new_request_id: Some("req-child".to_string()),
            linkage_id: None,
            referred_at: Some(utc(2024, 5, 3)),
        }];
        case
    }

    #[test]
    fn migrates_collaborations_and_referrals() {
        let mut case = legacy_case();
        assert_eq!(migrate_case(&mut case, utc(2025, 1, 1)), (2, 1));
        assert_eq!(case.linkages.len(), 3);

        let joint = &case.linkages[0];
        assert_eq!(joint.kind, LinkageType::Joint);
        assert_eq!(joint.approval_status, ApprovalStatus::Approved);
        assert_eq!(joint.execution_status, Some(ExecutionStatus::InProgress));
        assert_eq!(joint.migrated_from.as_deref(), Some("collaboration:col-1"));
        assert_eq!(joint.created_at, utc(2024, 5, 2));

        let requested = &case.linkages[1];
        assert_eq!(requested.kind, LinkageType::Consultation);
        assert_eq!(requested.approval_status, ApprovalStatus::Pending);
        assert!(requested.execution_status.is_none());
        assert_eq!(requested.approval_history.len(), 1);

        let referral = &case.linkages[2];
        assert_eq!(referral.category, LinkageCategory::Referral);
        assert_eq!(referral.new_request_id.as_deref(), Some("req-child"));
        assert_eq!(referral.execution_status, Some(ExecutionStatus::EmailSent));
        assert_eq!(case.referrals[0].linkage_id.as_deref(), Some(referral.id.as_str()));
    }

    #[test]
    fn undated_referral_takes_case_time() {
        let mut case = Case::new("노인맞춤돌봄서비스", "이영희", "010-0000-1111", utc(2024, 5, 1));
        case.referrals = vec![ReferralRecord {
            target_service: "긴급돌봄지원사업".to_string(),
            reason: String::new(),
            new_request_id: None,
            linkage_id: None,
            referred_at: None,
        }];
        assert_eq!(migrate_case(&mut case, utc(2025, 1, 1)), (0, 1));
        assert_eq!(case.linkages[0].created_at, utc(2024, 5, 1));
    }

    #[test]
    fn migration_is_idempotent() {
        let mut case = legacy_case();
        migrate_case(&mut case, utc(2025, 1, 1));
        let once = case.clone();
        assert_eq!(migrate_case(&mut case, utc(2025, 2, 1)), (0, 0));
        assert_eq!(case, once);
    }

    #[test]
    fn store_migration_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaseStore::open(dir.path()).unwrap();
        store.save(legacy_case()).unwrap();
        store
            .save(Case::new("a", "b", "c", utc(2025, 1, 1)))
            .unwrap();

        let first = store.migrate_legacy().unwrap();
        assert_eq!(
            first,
            MigrationReport {
                cases_changed: 1,
                collaborations_migrated: 2,
                referrals_migrated: 1,
            }
        );
        assert_eq!(store.migrate_legacy().unwrap(), MigrationReport::default());
    }
}
