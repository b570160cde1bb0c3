// Error types for the scoring and alerting paths.
//
// Bootstrap code (config, CLI, servers, model loading) uses anyhow. The
// moderation path needs to tell failure kinds apart, so it gets typed errors:
// the breaker counts some of them and the metrics label all of them.

use std::time::Duration;

/// Coarse classification of a failed scoring attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The attempt exceeded its deadline.
    Timeout,
    /// Connection or network failure, or the provider itself broke.
    Transport,
    /// The dependency answered, but not with a usable verdict.
    BadStatus,
}

/// Why a scoring call produced no scores.
///
/// Every variant means "no decision" to the moderation pipeline. None of them
/// is ever treated as a non-toxic result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("Scoring call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scoring service unreachable: {0}")]
    Transport(String),

    #[error("Scoring service returned HTTP {0}")]
    BadStatus(u16),

    #[error("Scoring service returned a malformed body: {0}")]
    Malformed(String),

    #[error("Local inference failed: {0}")]
    Inference(String),

    #[error("Scoring call cancelled by the request deadline")]
    Cancelled,
}

impl ScoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoreError::Timeout(_) | ScoreError::Cancelled => ErrorKind::Timeout,
            ScoreError::Transport(_) | ScoreError::Inference(_) => ErrorKind::Transport,
            ScoreError::BadStatus(_) | ScoreError::Malformed(_) => ErrorKind::BadStatus,
        }
    }

    /// Whether this error counts toward tripping the circuit breaker.
    ///
    /// Only "the dependency is down" errors count. A non-2xx answer means the
    /// service is up and rejected this one request, so it does not.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Transport)
    }

    /// Value of the `error_type` label on `scoring_errors_total`.
    pub fn metric_label(&self) -> String {
        match self {
            ScoreError::Timeout(_) => "timeout".to_string(),
            ScoreError::Transport(_) => "connection_error".to_string(),
            ScoreError::BadStatus(status) => format!("http_{status}"),
            ScoreError::Malformed(_) => "malformed_response".to_string(),
            ScoreError::Inference(_) => "inference_error".to_string(),
            ScoreError::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Alert delivery failures. These are logged and counted, never escalated.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Alert delivery failed: {0}")]
    Transport(String),

    #[error("Alert rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}
