//! Knowledge-base service records.
//!
//! Records come from the extraction pipeline's spreadsheet, whose columns
//! are Korean. Both the English field names and the original column names
//! are accepted when deserializing.

use serde::{Deserialize, Serialize};

/// One welfare service in the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    #[serde(default, alias = "대분류")]
    pub category_large: String,
    #[serde(default, alias = "중분류")]
    pub category_mid: String,
    #[serde(default, alias = "소분류")]
    pub category_small: String,

    #[serde(alias = "사업명")]
    pub name: String,
    /// Everyday-language tags, e.g. `#노인, #혼자, #거동불편`.
    #[serde(default, alias = "키워드 태그")]
    pub keywords: String,
    #[serde(default, alias = "지원 대상")]
    pub eligibility: String,
    #[serde(default, alias = "지원 내용")]
    pub benefits: String,
    #[serde(default, alias = "신청 방법")]
    pub how_to_apply: String,
    #[serde(default, alias = "문의처")]
    pub contact: String,
    #[serde(default, alias = "출처 URL")]
    pub source_url: String,
}

impl ServiceRecord {
    /// Minimal record for tests and fixtures.
    #[must_use]
    pub fn new(name: impl Into<String>, keywords: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.into(),
            ..Self::default()
        }
    }
}
