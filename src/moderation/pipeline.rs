// Moderation pipeline: one message from intake to (maybe) an alert.
//
//   message → breaker(scorer.score) → decide → [toxic] → alert sink
//
// The policy is fail-open. If the scoring service is down, slow, or the
// breaker is open, the message is let through without an alert and counted as
// an error. Infrastructure trouble never turns into a moderation action.
//
// Side effects happen in a fixed order: scoring-call metrics, then the
// verdict counter, then alert dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::alert::{format_alert, AlertSink};
use crate::error::{AlertError, ScoreError};
use crate::metrics::{CallOutcome, Metrics, VerdictLabel};
use crate::output::truncate_chars;
use crate::resilience::{BreakerConfig, BreakerError, CircuitBreaker};
use crate::scoring::{decide, DEFAULT_THRESHOLD};
use crate::toxicity::scorer::{ScoredText, Scorer};

/// An inbound chat message, as handed over by intake.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    /// Username, or the numeric user id when there is no username.
    pub author: String,
    pub text: String,
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Not toxic, or nothing to score.
    NoAction,
    /// Toxic; an alert was dispatched (delivery may still have failed).
    Alerted,
    /// No decision could be made. No alert was sent.
    ScoringFailed,
}

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// A category score strictly above this flags the message.
    pub threshold: f64,
    /// Chat that receives moderator alerts.
    pub alert_destination: String,
    /// Ceiling for one alert delivery attempt.
    pub alert_timeout: Duration,
    /// Ceiling for the whole of `process`, scoring and alerting included.
    pub request_deadline: Duration,
}

impl PipelineConfig {
    pub fn new(alert_destination: impl Into<String>) -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            alert_destination: alert_destination.into(),
            alert_timeout: Duration::from_secs(5),
            request_deadline: Duration::from_secs(20),
        }
    }
}

pub struct ModerationPipeline {
    scorer: Scorer,
    breaker: CircuitBreaker<ScoreError>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<Metrics>,
    config: PipelineConfig,
}

impl ModerationPipeline {
    pub fn new(
        scorer: Scorer,
        breaker_config: BreakerConfig,
        alerts: Arc<dyn AlertSink>,
        metrics: Arc<Metrics>,
        config: PipelineConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            breaker_config,
            ScoreError::counts_as_failure,
            Arc::clone(&metrics),
        );
        Self {
            scorer,
            breaker,
            alerts,
            metrics,
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker<ScoreError> {
        &self.breaker
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Process one message end to end.
    pub async fn process(&self, message: &Message) -> PipelineOutcome {
        if message.text.is_empty() {
            return PipelineOutcome::NoAction;
        }

        let started = Instant::now();
        let deadline = started + self.config.request_deadline;

        let attempt = tokio::time::timeout_at(deadline, self.score_guarded(&message.text));
        let scored = match attempt.await {
            Ok(Ok(scored)) => scored,
            Ok(Err(BreakerError::Open)) => {
                debug!(message_id = message.id, "Scoring skipped, circuit breaker open");
                return self.scoring_failed();
            }
            Ok(Err(BreakerError::Operation(err))) => {
                warn!(message_id = message.id, error = %err, "Scoring service unavailable");
                return self.scoring_failed();
            }
            Err(_) => {
                // Cut off before the breaker closure could record the attempt.
                let err = ScoreError::Cancelled;
                warn!(message_id = message.id, error = %err, "Scoring service unavailable");
                self.metrics.record_scoring_call(&CallOutcome::failure(&err, started.elapsed()));
                return self.scoring_failed();
            }
        };

        let verdict = decide(&scored.categories, self.config.threshold);
        if !verdict.toxic {
            self.metrics.record_message(VerdictLabel::NonToxic);
            return PipelineOutcome::NoAction;
        }
        self.metrics.record_message(VerdictLabel::Toxic);

        info!(
            message_id = message.id,
            chat_id = message.chat_id,
            author = %message.author,
            toxicity = verdict.primary_score,
            reasons = %verdict.reasons_label(),
            text_preview = %truncate_chars(&message.text, 50),
            "Toxic message detected"
        );

        let alert = format_alert(&message.author, &verdict, &message.text);
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .min(self.config.alert_timeout);
        if let Err(err) = self.dispatch_alert(&alert, budget).await {
            self.metrics.record_alert_failure();
            warn!(message_id = message.id, error = %err, "Failed to send alert");
        }

        PipelineOutcome::Alerted
    }

    /// The breaker-guarded scoring call. Latency and error labels are recorded
    /// for every attempt that actually runs; breaker rejections record nothing.
    async fn score_guarded(&self, text: &str) -> Result<ScoredText, BreakerError<ScoreError>> {
        self.breaker
            .execute(|| async {
                let started = Instant::now();
                let result = self.scorer.score(text).await;
                let outcome = match &result {
                    Ok(_) => CallOutcome::success(started.elapsed()),
                    Err(err) => CallOutcome::failure(err, started.elapsed()),
                };
                if let Some(kind) = outcome.error_kind {
                    debug!(
                        error_kind = ?kind,
                        latency_ms = outcome.latency.as_millis() as u64,
                        "Scoring attempt failed"
                    );
                }
                self.metrics.record_scoring_call(&outcome);
                result
            })
            .await
    }

    async fn dispatch_alert(&self, alert: &str, budget: Duration) -> Result<(), AlertError> {
        let send = self.alerts.send_alert(&self.config.alert_destination, alert);
        match tokio::time::timeout(budget, send).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout(budget)),
        }
    }

    fn scoring_failed(&self) -> PipelineOutcome {
        self.metrics.record_message(VerdictLabel::Error);
        PipelineOutcome::ScoringFailed
    }
}
