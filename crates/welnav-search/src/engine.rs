//! Weighted relevance scoring over the knowledge base.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use welnav_core::error::{Result, WelnavError};
use welnav_core::ServiceRecord;

use crate::terms::{self, QueryTerms};

/// Maximum number of results returned.
pub const MAX_RESULTS: usize = 5;
/// Results scoring below this fraction of the top score are dropped.
pub const NOISE_FLOOR: f64 = 0.3;

// Field weights: name > keyword tags > eligibility ≈ benefits.
const NAME_WEIGHT: f64 = 10.0;
const KEYWORD_WEIGHT: f64 = 7.0;
const ELIGIBILITY_WEIGHT: f64 = 4.0;
const BENEFITS_WEIGHT: f64 = 3.0;

// Tier multipliers.
const ORIGINAL_FACTOR: f64 = 1.0;
const EXPANDED_FACTOR: f64 = 0.7;
const DECOMPOSED_FACTOR: f64 = 0.5;

/// Relevance bucket relative to the top score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    fn of(score: f64, top: f64) -> Self {
        let ratio = score / top;
        if ratio >= 0.8 {
            Self::High
        } else if ratio >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub fn stars(self) -> &'static str {
        match self {
            Self::High => "★★★",
            Self::Medium => "★★☆",
            Self::Low => "★☆☆",
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit<'a> {
    pub record: &'a ServiceRecord,
    pub score: f64,
    pub relevance: Relevance,
}

/// The static, read-only collection of service records.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    records: Vec<ServiceRecord>,
}

impl KnowledgeBase {
    #[must_use]
    pub fn new(records: Vec<ServiceRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of service records.
    ///
    /// # Errors
    ///
    /// [`WelnavError::Io`] if the file cannot be read,
    /// [`WelnavError::Serialization`] if it is not an array of records.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<ServiceRecord> = serde_json::from_str(&raw)
            .map_err(|e| WelnavError::Serialization(format!("{}: {e}", path.display())))?;
        info!(count = records.len(), path = %path.display(), "loaded knowledge base");
        Ok(Self { records })
    }

    #[must_use]
    pub fn records(&self) -> &[ServiceRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rank the records against `query`.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<SearchHit<'_>> {
        let terms = terms::extract(query);
        let hits = self.rank(&terms);
        debug!(
            original = terms.original.len(),
            expanded = terms.expanded.len(),
            decomposed = terms.decomposed.len(),
            hits = hits.len(),
            "knowledge base search"
        );
        hits
    }

    /// Rank the records against already-extracted terms.
    #[must_use]
    pub fn rank(&self, terms: &QueryTerms) -> Vec<SearchHit<'_>> {
        let mut scored: Vec<(&ServiceRecord, f64)> = self
            .records
            .iter()
            .map(|r| (r, score(r, terms)))
            .collect();
        // Stable: ties keep knowledge-base order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top = scored.first().map_or(0.0, |(_, s)| *s);
        if top <= 0.0 {
            return Vec::new();
        }
        scored
            .into_iter()
            .take(MAX_RESULTS)
            .filter(|(_, s)| *s >= top * NOISE_FLOOR)
            .map(|(record, score)| SearchHit {
                record,
                score,
                relevance: Relevance::of(score, top),
            })
            .collect()
    }
}

/// Sum of field weight × tier factor over every (term, field) match.
#[must_use]
pub fn score(record: &ServiceRecord, terms: &QueryTerms) -> f64 {
    let fields = [
        (record.name.to_lowercase(), NAME_WEIGHT),
        (record.keywords.to_lowercase(), KEYWORD_WEIGHT),
        (record.eligibility.to_lowercase(), ELIGIBILITY_WEIGHT),
        (record.benefits.to_lowercase(), BENEFITS_WEIGHT),
    ];
    let tiers = [
        (&terms.original, ORIGINAL_FACTOR),
        (&terms.expanded, EXPANDED_FACTOR),
        (&terms.decomposed, DECOMPOSED_FACTOR),
    ];

    let mut total = 0.0;
    for (tier, factor) in tiers {
        for term in tier {
            for (field, weight) in &fields {
                if field.contains(term.as_str()) {
                    total += weight * factor;
                }
            }
        }
    }
    total
}
