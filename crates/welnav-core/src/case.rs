//! Case: one citizen's service engagement, tracked end to end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::linkage::Linkage;
use crate::temporal;

/// Case-level lifecycle status.
///
/// The main sequence is `open → confirmed → contacted → connected → closed`.
/// `referred` is the entry state of cases spawned by an approved referral:
/// such a case may advance into the main sequence, but no case can ever be
/// moved *into* `referred` through a status update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Open,
    Confirmed,
    Contacted,
    Connected,
    Closed,
    Referred,
}

impl CaseStatus {
    /// Every status, main sequence first.
    pub const ALL: [CaseStatus; 6] = [
        Self::Open,
        Self::Confirmed,
        Self::Contacted,
        Self::Connected,
        Self::Closed,
        Self::Referred,
    ];

    /// Position in the forward sequence. `referred` shares rank 0 with `open`.
    fn rank(self) -> u8 {
        match self {
            Self::Open | Self::Referred => 0,
            Self::Confirmed => 1,
            Self::Contacted => 2,
            Self::Connected => 3,
            Self::Closed => 4,
        }
    }

    /// Whether a status update from `self` to `next` moves strictly forward.
    #[must_use]
    pub fn can_advance_to(self, next: CaseStatus) -> bool {
        next != Self::Referred && next.rank() > self.rank()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Confirmed => "confirmed",
            Self::Contacted => "contacted",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Referred => "referred",
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown case status '{s}'"))
    }
}

/// A free-text note on a case. Notes are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseNote {
    pub author: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Forward reference from a case to a case spawned by referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRecord {
    /// Service the case was handed off to.
    pub target_service: String,
    #[serde(default)]
    pub reason: String,
    /// The spawned case, once it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_request_id: Option<String>,
    /// Linkage that authorized this referral (absent on pre-linkage data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkage_id: Option<String>,
    /// Missing on some pre-linkage records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_at: Option<DateTime<Utc>>,
}

/// One step of a service plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// Collaboration request in the shape used before linkages existed.
///
/// Only read by the migration in `welnav-store`; never written by new code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCollaboration {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub from_dept: String,
    #[serde(default)]
    pub to_dept: String,
    #[serde(default)]
    pub reason: String,
    /// `requested`, `accepted`, `in_progress`, `completed` or `declined`.
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A citizen's service engagement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    // === Identity ===
    pub id: String,

    // === Application ===
    pub service: String,
    pub applicant_name: String,
    pub applicant_phone: String,

    // === Timestamps ===
    /// Locale-formatted creation time; parsed only when `created_at` is absent.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    // === Lifecycle ===
    #[serde(default)]
    pub status: CaseStatus,
    #[serde(default)]
    pub notes: Vec<CaseNote>,

    // === Referral lineage ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_from: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referrals: Vec<ReferralRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collaborations: Vec<LegacyCollaboration>,

    // === Linkages (append-only) ===
    #[serde(default)]
    pub linkages: Vec<Linkage>,

    // === Planning & AI annotations ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_plan: Option<Vec<PlanStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_department: Option<String>,
}

impl Case {
    /// Create an open case with a fresh id, stamped at `at`.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        applicant_name: impl Into<String>,
        applicant_phone: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_case_id(),
            service: service.into(),
            applicant_name: applicant_name.into(),
            applicant_phone: applicant_phone.into(),
            timestamp: temporal::format_display(at),
            created_at: Some(at),
            updated_at: Some(at),
            status: CaseStatus::Open,
            notes: Vec::new(),
            referred_from: None,
            referrals: Vec::new(),
            collaborations: Vec::new(),
            linkages: Vec::new(),
            service_plan: None,
            ai_summary: None,
            ai_rationale: None,
            assigned_department: None,
        }
    }

    /// Spawn the case a referral hands off to: same applicant, new service,
    /// status `referred`, back-reference to `self`.
    #[must_use]
    pub fn spawn_referral(&self, target_service: impl Into<String>, at: DateTime<Utc>) -> Self {
        let mut spawned = Self::new(
            target_service,
            self.applicant_name.clone(),
            self.applicant_phone.clone(),
            at,
        );
        spawned.status = CaseStatus::Referred;
        spawned.referred_from = Some(self.id.clone());
        spawned
    }

    /// Authoritative ordering instant (see [`temporal::ordering_key`]).
    #[must_use]
    pub fn ordering_key(&self) -> DateTime<Utc> {
        temporal::ordering_key(self.created_at, &self.timestamp)
    }

    #[must_use]
    pub fn linkage(&self, linkage_id: &str) -> Option<&Linkage> {
        self.linkages.iter().find(|l| l.id == linkage_id)
    }

    pub fn linkage_mut(&mut self, linkage_id: &str) -> Option<&mut Linkage> {
        self.linkages.iter_mut().find(|l| l.id == linkage_id)
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

/// Generate an opaque case id.
#[must_use]
pub fn new_case_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    const MAIN: [CaseStatus; 5] = [
        CaseStatus::Open,
        CaseStatus::Confirmed,
        CaseStatus::Contacted,
        CaseStatus::Connected,
        CaseStatus::Closed,
    ];

    #[test]
    fn new_case_is_open_with_both_timestamps() {
        let case = Case::new("긴급돌봄지원사업", "김민수", "010-1234-5678", utc(2025, 2, 10));
        assert_eq!(case.status, CaseStatus::Open);
        assert!(case.id.starts_with("req-"));
        assert_eq!(case.created_at, Some(utc(2025, 2, 10)));
        assert!(case.timestamp.starts_with("2025. 2. 10."));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_case_id(), new_case_id());
    }

    #[test]
    fn referred_is_never_a_target() {
        for from in CaseStatus::ALL {
            assert!(!from.can_advance_to(CaseStatus::Referred));
        }
        assert!(!CaseStatus::Closed.can_advance_to(CaseStatus::Referred));
    }

    #[test]
    fn referred_case_can_enter_main_sequence() {
        assert!(CaseStatus::Referred.can_advance_to(CaseStatus::Confirmed));
        assert!(CaseStatus::Referred.can_advance_to(CaseStatus::Closed));
        assert!(!CaseStatus::Referred.can_advance_to(CaseStatus::Open));
    }

    #[test]
    fn spawn_referral_copies_applicant_and_links_back() {
        let parent = Case::new("노인맞춤돌봄서비스", "이영희", "010-0000-1111", utc(2025, 1, 1));
        let child = parent.spawn_referral("긴급돌봄지원사업", utc(2025, 1, 2));
        assert_ne!(child.id, parent.id);
        assert_eq!(child.status, CaseStatus::Referred);
        assert_eq!(child.referred_from.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.applicant_name, "이영희");
        assert_eq!(child.service, "긴급돌봄지원사업");
    }

    #[test]
    fn status_parses_from_wire_names() {
        for st in CaseStatus::ALL {
            assert_eq!(st.as_str().parse::<CaseStatus>().unwrap(), st);
        }
        assert!("archived".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn missing_optional_fields_deserialize_to_defaults() {
        let json = r#"{
            "id": "req-legacy",
            "service": "장애인활동지원",
            "applicantName": "박철수",
            "applicantPhone": "010-2222-3333",
            "timestamp": "2024. 12. 1. 오전 9:00:00"
        }"#;
        let case: Case = serde_json::from_str(json).unwrap();
        assert_eq!(case.status, CaseStatus::Open);
        assert!(case.linkages.is_empty());
        assert!(case.created_at.is_none());
        assert_eq!(case.ordering_key(), utc(2024, 12, 1));
    }

    proptest! {
        #[test]
        fn backward_or_equal_moves_never_advance(a in 0usize..5, b in 0usize..5) {
            prop_assume!(b <= a);
            prop_assert!(!MAIN[a].can_advance_to(MAIN[b]));
        }

        #[test]
        fn strictly_forward_moves_advance(a in 0usize..5, b in 0usize..5) {
            prop_assume!(b > a);
            prop_assert!(MAIN[a].can_advance_to(MAIN[b]));
        }
    }
}
