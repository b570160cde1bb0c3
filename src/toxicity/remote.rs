// Remote scoring service client.
//
// The relay never runs the model itself. It POSTs text to the scoring
// service (`toxguard scorer`, or anything speaking the same contract) and
// reads back per-category scores. Each attempt is bounded by the client
// timeout; failures are classified so the breaker and metrics can tell a
// dead service (timeout, connection error) from one that answered badly
// (non-2xx, unparseable body).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::api::{ScoreRequest, ScoreResponse};
use super::traits::{CategoryScores, ScoreProvider};
use crate::error::ScoreError;
use crate::output::truncate_chars;

/// Default scoring service endpoint (the compose service name).
pub const DEFAULT_TOXICITY_URL: &str = "http://toxicity-svc:8080/analyze";

/// HTTP client for the scoring service.
pub struct RemoteScoreProvider {
    client: Client,
    url: String,
    timeout: Duration,
}

impl RemoteScoreProvider {
    /// Create a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build scoring service HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ScoreError {
        if err.is_timeout() {
            ScoreError::Timeout(self.timeout)
        } else {
            ScoreError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ScoreProvider for RemoteScoreProvider {
    async fn score_text(&self, text: &str) -> Result<CategoryScores, ScoreError> {
        let request = ScoreRequest {
            text: text.to_string(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoreError::BadStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let result: ScoreResponse = serde_json::from_slice(&body)
            .map_err(|e| ScoreError::Malformed(e.to_string()))?;

        debug!(
            toxic = result.toxic,
            toxicity = result.toxicity,
            reasons = ?result.reasons,
            text_preview = %truncate_chars(text, 50),
            "Scoring service responded"
        );

        Ok(result.category_scores())
    }
}
