//! Optional AI-summarization collaborator.
//!
//! Summaries are decoration: a summarizer that fails or is absent yields
//! `None` and never blocks intake or approval.

/// Turns a counseling transcript into a short case summary.
pub trait Summarizer: Send + Sync {
    /// Summarize `transcript`, or return `None` on any failure.
    fn summarize(&self, transcript: &str) -> Option<String>;
}

/// Summarizer that never produces anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSummarizer;

impl Summarizer for NoSummarizer {
    fn summarize(&self, _transcript: &str) -> Option<String> {
        None
    }
}

/// Keeps the user's own lines from a transcript, trimmed to a length budget.
///
/// Lines prefixed `user:` / `사용자:` are kept; everything else is dropped.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSummarizer {
    pub max_chars: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self { max_chars: 200 }
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, transcript: &str) -> Option<String> {
        let said: Vec<&str> = transcript
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                line.strip_prefix("user:")
                    .or_else(|| line.strip_prefix("사용자:"))
                    .map(str::trim)
            })
            .filter(|s| !s.is_empty())
            .collect();
        if said.is_empty() {
            return None;
        }
        let joined = said.join(" ");
        if joined.chars().count() <= self.max_chars {
            return Some(joined);
        }
        let mut cut: String = joined.chars().take(self.max_chars).collect();
        cut.push('…');
        Some(cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_summarizer_is_silent() {
        assert!(NoSummarizer.summarize("user: 안녕하세요").is_none());
    }

    #[test]
    fn extractive_keeps_user_lines() {
        let transcript = "user: 혼자 사는 어머니가 아프세요\nassistant: 긴급돌봄을 안내드립니다\n사용자: 신청하고 싶어요";
        assert_eq!(
            ExtractiveSummarizer::default().summarize(transcript).as_deref(),
            Some("혼자 사는 어머니가 아프세요 신청하고 싶어요")
        );
    }

    #[test]
    fn extractive_truncates_on_char_boundary() {
        let s = ExtractiveSummarizer { max_chars: 3 };
        assert_eq!(s.summarize("user: 돌봄지원사업").as_deref(), Some("돌봄지…"));
        assert!(s.summarize("assistant: only").is_none());
    }
}
