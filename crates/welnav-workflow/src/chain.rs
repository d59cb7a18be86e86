//! Referral chain: the full lineage of a case.
//!
//! Walks `referred_from` back to the root, then the case itself, then every
//! descendant reached through forward `referrals` entries (depth first, in
//! record order). A visited set shared by both directions guarantees
//! termination and at most one entry per case id even on cyclic data.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use welnav_core::{Case, CaseStatus};
use welnav_store::Snapshot;

/// One case in a referral chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub id: String,
    pub service: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub status: CaseStatus,
    /// Reason given on the forward hop that led to this case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub is_current: bool,
}

impl ChainEntry {
    fn from_case(case: &Case, reason: Option<String>, is_current: bool) -> Self {
        Self {
            id: case.id.clone(),
            service: case.service.clone(),
            timestamp: case.timestamp.clone(),
            created_at: case.created_at,
            status: case.status,
            reason,
            is_current,
        }
    }
}

/// Build the lineage of `case_id`. Returns an empty chain if it is absent.
#[must_use]
pub fn referral_chain(cases: &Snapshot, case_id: &str) -> Vec<ChainEntry> {
    let Some(current) = cases.get(case_id) else {
        return Vec::new();
    };

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(current.id.as_str());

    // Ancestors, nearest first.
    let mut ancestors = Vec::new();
    let mut cursor = current.referred_from.as_deref();
    while let Some(parent_id) = cursor {
        if !visited.insert(parent_id) {
            break;
        }
        let Some(parent) = cases.get(parent_id) else {
            break;
        };
        ancestors.push(ChainEntry::from_case(parent, None, false));
        cursor = parent.referred_from.as_deref();
    }
    ancestors.reverse();

    let mut chain = ancestors;
    chain.push(ChainEntry::from_case(current, None, true));

    // Descendants, depth first in record order.
    let mut stack: Vec<(&str, &str)> = forward_hops(current).rev().collect();
    while let Some((child_id, reason)) = stack.pop() {
        if !visited.insert(child_id) {
            continue;
        }
        let Some(child) = cases.get(child_id) else {
            continue;
        };
        chain.push(ChainEntry::from_case(child, Some(reason.to_string()), false));
        stack.extend(forward_hops(child).rev());
    }

    chain
}

fn forward_hops(case: &Case) -> impl DoubleEndedIterator<Item = (&str, &str)> {
    case.referrals.iter().filter_map(|r| {
        r.new_request_id
            .as_deref()
            .map(|id| (id, r.reason.as_str()))
    })
}

/// Cut a chain down to at most `max_len` entries, keeping the current case
/// inside the window.
#[must_use]
pub fn truncate_chain(chain: &[ChainEntry], max_len: usize) -> &[ChainEntry] {
    if chain.len() <= max_len {
        return chain;
    }
    let current = chain.iter().position(|e| e.is_current).unwrap_or(0);
    let start = current
        .saturating_sub(max_len / 2)
        .min(chain.len() - max_len);
    &chain[start..start + max_len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use welnav_core::case::ReferralRecord;

    fn utc(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    fn case(id: &str, d: u32) -> Case {
        let mut c = Case::new(format!("service-{id}"), "김민수", "010-1234-5678", utc(d));
        c.id = id.to_string();
        c
    }

    fn refer(snapshot: &mut Snapshot, from: &str, to: &str, reason: &str) {
        snapshot
            .get_mut(to)
            .unwrap()
            .referred_from = Some(from.to_string());
        snapshot.get_mut(from).unwrap().referrals.push(ReferralRecord {
            target_service: format!("service-{to}"),
            reason: reason.to_string(),
            new_request_id: Some(to.to_string()),
            linkage_id: None,
            referred_at: Some(utc(1)),
        });
    }

    fn snapshot(ids: &[&str]) -> Snapshot {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), case(id, i as u32 + 1)))
            .collect()
    }

    fn ids(chain: &[ChainEntry]) -> Vec<&str> {
        chain.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn missing_case_yields_empty_chain() {
        assert!(referral_chain(&Snapshot::new(), "nope").is_empty());
    }

    #[test]
    fn single_case_is_its_own_chain() {
        let s = snapshot(&["a"]);
        let chain = referral_chain(&s, "a");
        assert_eq!(ids(&chain), vec!["a"]);
        assert!(chain[0].is_current);
    }

    #[test]
    fn ancestors_then_current_then_descendants() {
        let mut s = snapshot(&["root", "mid", "cur", "kid1", "kid2", "grandkid"]);
        refer(&mut s, "root", "mid", "r1");
        refer(&mut s, "mid", "cur", "r2");
        refer(&mut s, "cur", "kid1", "r3");
        refer(&mut s, "kid1", "grandkid", "r5");
        refer(&mut s, "cur", "kid2", "r4");

        let chain = referral_chain(&s, "cur");
        assert_eq!(
            ids(&chain),
            vec!["root", "mid", "cur", "kid1", "grandkid", "kid2"]
        );
        assert!(chain[2].is_current);
        assert_eq!(chain.iter().filter(|e| e.is_current).count(), 1);
        assert_eq!(chain[3].reason.as_deref(), Some("r3"));
        assert_eq!(chain[4].reason.as_deref(), Some("r5"));
        assert!(chain[0].reason.is_none());
    }

    #[test]
    fn cycles_terminate_with_unique_ids() {
        let mut s = snapshot(&["a", "b", "c"]);
        refer(&mut s, "a", "b", "ab");
        refer(&mut s, "b", "c", "bc");
        // c points forward to a and a claims to come from c.
        refer(&mut s, "c", "a", "ca");

        for start in ["a", "b", "c"] {
            let chain = referral_chain(&s, start);
            let unique: HashSet<_> = chain.iter().map(|e| e.id.clone()).collect();
            assert_eq!(unique.len(), chain.len());
            assert_eq!(chain.len(), 3);
        }
    }

    #[test]
    fn self_reference_is_ignored() {
        let mut s = snapshot(&["a"]);
        refer(&mut s, "a", "a", "loop");
        assert_eq!(ids(&referral_chain(&s, "a")), vec!["a"]);
    }

    #[test]
    fn dangling_references_are_skipped() {
        let mut s = snapshot(&["a"]);
        s.get_mut("a").unwrap().referred_from = Some("gone".to_string());
        s.get_mut("a").unwrap().referrals.push(ReferralRecord {
            target_service: "x".to_string(),
            reason: "x".to_string(),
            new_request_id: Some("also-gone".to_string()),
            linkage_id: None,
            referred_at: Some(utc(1)),
        });
        assert_eq!(ids(&referral_chain(&s, "a")), vec!["a"]);
    }

    #[test]
    fn truncation_keeps_current_in_window() {
        let ids_list: Vec<String> = (0..20).map(|i| format!("c{i:02}")).collect();
        let refs: Vec<&str> = ids_list.iter().map(String::as_str).collect();
        let mut s = snapshot(&refs);
        for pair in refs.windows(2) {
            refer(&mut s, pair[0], pair[1], "next");
        }

        let chain = referral_chain(&s, "c15");
        assert_eq!(chain.len(), 20);
        let window = truncate_chain(&chain, 6);
        assert_eq!(window.len(), 6);
        assert!(window.iter().any(|e| e.is_current));

        let head = referral_chain(&s, "c00");
        assert_eq!(truncate_chain(&head, 4)[0].id, "c00");
        assert_eq!(truncate_chain(&head, 50).len(), 20);
    }
}
