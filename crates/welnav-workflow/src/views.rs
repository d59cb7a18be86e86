//! Read-side dashboard views over the case collection.

use std::collections::BTreeMap;

use serde::Serialize;

use welnav_core::{ApprovalStatus, Case, CaseStatus, Linkage};
use welnav_store::Snapshot;

/// A linkage denormalized with its case's applicant and service fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkageView {
    pub case_id: String,
    pub applicant_name: String,
    pub applicant_phone: String,
    pub service: String,
    pub case_status: CaseStatus,
    #[serde(flatten)]
    pub linkage: Linkage,
}

impl LinkageView {
    fn new(case: &Case, linkage: &Linkage) -> Self {
        Self {
            case_id: case.id.clone(),
            applicant_name: case.applicant_name.clone(),
            applicant_phone: case.applicant_phone.clone(),
            service: case.service.clone(),
            case_status: case.status,
            linkage: linkage.clone(),
        }
    }
}

/// Every linkage whose approval status satisfies `keep`, newest created first.
#[must_use]
pub fn linkages_where(
    cases: &Snapshot,
    keep: impl Fn(ApprovalStatus) -> bool,
) -> Vec<LinkageView> {
    let mut views: Vec<LinkageView> = cases
        .values()
        .flat_map(|case| {
            case.linkages
                .iter()
                .filter(|l| keep(l.approval_status))
                .map(move |l| LinkageView::new(case, l))
        })
        .collect();
    views.sort_by(|a, b| b.linkage.created_at.cmp(&a.linkage.created_at));
    views
}

/// Awaiting the department coordinator.
#[must_use]
pub fn pending_for_department(cases: &Snapshot) -> Vec<LinkageView> {
    linkages_where(cases, |s| s == ApprovalStatus::Pending)
}

/// Department-approved, awaiting the administrator.
#[must_use]
pub fn pending_for_admin(cases: &Snapshot) -> Vec<LinkageView> {
    linkages_where(cases, |s| s == ApprovalStatus::DeptApproved)
}

/// Bounced back to the department by the administrator.
#[must_use]
pub fn returned_to_department(cases: &Snapshot) -> Vec<LinkageView> {
    linkages_where(cases, ApprovalStatus::is_returned)
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_cases: usize,
    pub cases_by_status: BTreeMap<String, usize>,
    pub total_linkages: usize,
    pub linkages_by_approval: BTreeMap<String, usize>,
}

#[must_use]
pub fn stats(cases: &Snapshot) -> DashboardStats {
    let mut out = DashboardStats {
        total_cases: cases.len(),
        cases_by_status: CaseStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect(),
        linkages_by_approval: ApprovalStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect(),
        ..DashboardStats::default()
    };
    for case in cases.values() {
        *out.cases_by_status
            .entry(case.status.as_str().to_string())
            .or_default() += 1;
        for linkage in &case.linkages {
            out.total_linkages += 1;
            *out.linkages_by_approval
                .entry(linkage.approval_status.as_str().to_string())
                .or_default() += 1;
        }
    }
    out
}
