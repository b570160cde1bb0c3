// Scorer: text normalization plus a time-bounded call to a score provider.
//
// Text is cut to MAX_TEXT_CHARS characters before it reaches the provider,
// which bounds both request size and inference cost. Truncation is by
// character, never by byte, so multi-byte text can't split mid-codepoint.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::ScoreError;
use crate::output::truncate_chars;
use crate::toxicity::traits::{Category, CategoryScores, ScoreProvider};

/// Longest text (in characters) ever sent to a provider.
pub const MAX_TEXT_CHARS: usize = 512;

/// Cut `text` to at most `MAX_TEXT_CHARS` characters.
pub fn normalize(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// What was actually scored, and the result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredText {
    /// The normalized text the provider saw.
    pub text: String,
    pub categories: CategoryScores,
}

pub struct Scorer {
    provider: Arc<dyn ScoreProvider>,
    call_timeout: Duration,
}

impl Scorer {
    pub fn new(provider: Arc<dyn ScoreProvider>, call_timeout: Duration) -> Self {
        Self {
            provider,
            call_timeout,
        }
    }

    /// Normalize and score `text`. A provider that doesn't answer within the
    /// call timeout yields `ScoreError::Timeout`.
    pub async fn score(&self, text: &str) -> Result<ScoredText, ScoreError> {
        let text = normalize(text);
        let categories =
            match tokio::time::timeout(self.call_timeout, self.provider.score_text(text)).await {
                Ok(result) => result?,
                Err(_) => return Err(ScoreError::Timeout(self.call_timeout)),
            };

        debug!(
            toxicity = categories.get(Category::Toxicity),
            text_preview = %truncate_chars(text, 50),
            "Scored text"
        );

        Ok(ScoredText {
            text: text.to_string(),
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Records what it was asked to score; optionally never answers.
    struct Recorder {
        seen: Mutex<Vec<String>>,
        hang: bool,
    }

    #[async_trait]
    impl ScoreProvider for Recorder {
        async fn score_text(&self, text: &str) -> Result<CategoryScores, ScoreError> {
            self.seen.lock().unwrap().push(text.to_string());
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(CategoryScores::from_pairs([(Category::Toxicity, 0.4)]))
        }
    }

    fn recorder(hang: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            hang,
        })
    }

    #[tokio::test]
    async fn test_score_passes_normalized_text_to_provider() {
        let provider = recorder(false);
        let scorer = Scorer::new(provider.clone(), Duration::from_secs(5));
        let long = "x".repeat(MAX_TEXT_CHARS * 2);

        let scored = scorer.score(&long).await.unwrap();

        assert_eq!(scored.text.len(), MAX_TEXT_CHARS);
        assert_eq!(scored.categories.get(Category::Toxicity), 0.4);
        assert_eq!(provider.seen.lock().unwrap()[0].len(), MAX_TEXT_CHARS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let scorer = Scorer::new(recorder(true), Duration::from_secs(5));

        let err = scorer.score("hello").await.unwrap_err();

        assert_eq!(err, ScoreError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.metric_label(), "timeout");
    }

    #[test]
    fn test_normalize_leaves_short_text_alone() {
        assert_eq!(normalize("hello"), "hello");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_truncates_to_limit() {
        let long = "a".repeat(MAX_TEXT_CHARS + 100);
        assert_eq!(normalize(&long).len(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_normalize_exact_limit_is_untouched() {
        let exact = "b".repeat(MAX_TEXT_CHARS);
        assert_eq!(normalize(&exact), exact);
    }

    #[test]
    fn test_normalize_respects_char_boundaries() {
        let emoji = "🔥".repeat(MAX_TEXT_CHARS + 1);
        let cut = normalize(&emoji);
        assert_eq!(cut.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(cut.len(), MAX_TEXT_CHARS * 4);
    }
}
