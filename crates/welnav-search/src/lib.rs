//! # welnav-search
//!
//! Keyword-expansion relevance search over the welfare knowledge base.
//!
//! A query is split into three term tiers ([`terms`]), every record is
//! scored by field and tier weight ([`engine`]), and the surviving top
//! results are rendered for the chat prompt ([`context`]).

pub mod context;
pub mod engine;
pub mod terms;

pub use context::{assemble, ContextOpts};
pub use engine::{KnowledgeBase, Relevance, SearchHit, MAX_RESULTS, NOISE_FLOOR};
pub use terms::{extract, QueryTerms};
