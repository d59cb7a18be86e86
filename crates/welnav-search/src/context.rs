//! Prompt-context assembly for ranked search results.
//!
//! Renders surviving hits as a block the chat layer can drop into its
//! prompt, strongest first, each tagged with its relevance stars.

use std::fmt::Write as _;

use crate::engine::SearchHit;

/// Options for context assembly.
#[derive(Debug, Clone)]
pub struct ContextOpts {
    /// Maximum characters in the assembled block.
    pub max_chars: usize,
    /// Include application method and contact lines.
    pub include_contact: bool,
}

impl Default for ContextOpts {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            include_contact: true,
        }
    }
}

/// Assemble hits into a prompt block. Returns an empty string for no hits.
///
/// Whole entries are dropped from the end once the character budget is
/// exhausted; the first entry is always kept.
#[must_use]
pub fn assemble(hits: &[SearchHit<'_>], opts: &ContextOpts) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut output = String::from("[관련 복지 서비스]\n");
    for (i, hit) in hits.iter().enumerate() {
        let entry = format_entry(i + 1, hit, opts);
        if i > 0 && output.chars().count() + entry.chars().count() > opts.max_chars {
            break;
        }
        output.push_str(&entry);
    }
    output.trim_end().to_string()
}

fn format_entry(rank: usize, hit: &SearchHit<'_>, opts: &ContextOpts) -> String {
    let r = hit.record;
    let mut entry = String::new();
    let _ = write!(entry, "{rank}. {} {}", hit.relevance.stars(), r.name);
    let category: Vec<&str> = [&r.category_large, &r.category_mid, &r.category_small]
        .into_iter()
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .collect();
    if !category.is_empty() {
        let _ = write!(entry, " ({})", category.join(" > "));
    }
    entry.push('\n');

    let mut line = |label: &str, value: &str| {
        if !value.trim().is_empty() {
            let _ = writeln!(entry, "   - {label}: {}", value.trim());
        }
    };
    line("지원 대상", r.eligibility.as_str());
    line("지원 내용", r.benefits.as_str());
    if opts.include_contact {
        line("신청 방법", r.how_to_apply.as_str());
        line("문의처", r.contact.as_str());
    }
    entry.push('\n');
    entry
}
