// Circuit breaker guarding calls to the scoring service.
//
// States:
//   Closed   → calls pass; counted failures accumulate, any success resets
//   Open     → calls fail fast with BreakerError::Open until recovery_timeout
//   HalfOpen → exactly one trial call is in flight
//
// Transitions:
//   Closed   → Open:     consecutive counted failures reach failure_threshold
//   Open     → HalfOpen: first call after recovery_timeout becomes the trial
//   HalfOpen → Closed:   trial succeeds
//   HalfOpen → Open:     trial fails (or is cancelled); recovery timer restarts
//
// All state lives behind one mutex. The lock is taken twice per call (admit,
// then record) and never held across the awaited operation.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;

/// Current position in the breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive counted failures that trip the breaker (minimum 1).
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    #[error("Circuit breaker is open, call not attempted")]
    Open,

    /// The operation ran and failed. The error is passed through unchanged.
    #[error(transparent)]
    Operation(E),
}

/// Circuit breaker over operations failing with `E`.
///
/// `classify` decides which errors count toward the failure threshold. Errors
/// it rejects are treated like successes by the state machine: the dependency
/// answered, so it is not down.
pub struct CircuitBreaker<E> {
    config: BreakerConfig,
    classify: fn(&E) -> bool,
    inner: Mutex<BreakerInner>,
    metrics: Arc<Metrics>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl<E> CircuitBreaker<E> {
    pub fn new(config: BreakerConfig, classify: fn(&E) -> bool, metrics: Arc<Metrics>) -> Self {
        let config = BreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            ..config
        };
        metrics.set_breaker_open(false);
        Self {
            config,
            classify,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            metrics,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns `BreakerError::Open` without calling `operation` while the
    /// breaker is open (or while another caller holds the half-open trial).
    /// Otherwise the operation's own result comes back unchanged, after its
    /// outcome has been applied to the state machine.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.admit() else {
            debug!("Circuit breaker open, rejecting call");
            return Err(BreakerError::Open);
        };

        let result = operation().await;
        let failed = matches!(&result, Err(err) if (self.classify)(err));
        permit.complete(failed);

        result.map_err(BreakerError::Operation)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed. Taking the half-open trial happens
    /// under the same lock as the state check, so only one caller can win it.
    fn admit(&self) -> Option<Permit<'_, E>> {
        let mut inner = self.lock();
        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::HalfOpen => return None,
            BreakerState::Open => {
                let recovered = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if !recovered {
                    return None;
                }
                inner.state = BreakerState::HalfOpen;
                self.metrics.set_breaker_open(false);
                info!("Circuit breaker half-open, admitting trial call");
                true
            }
        };
        Some(Permit {
            breaker: self,
            trial,
            completed: false,
        })
    }

    fn record(&self, trial: bool, failed: bool) {
        let mut inner = self.lock();
        if trial {
            if failed {
                self.trip(&mut inner, "trial call failed");
            } else {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.metrics.set_breaker_open(false);
                info!("Circuit breaker closed, scoring service recovered");
            }
            return;
        }

        // Outcomes of calls admitted before a trip no longer affect the state.
        if inner.state != BreakerState::Closed {
            return;
        }
        if failed {
            inner.consecutive_failures += 1;
            if inner.consecutive_failures >= self.config.failure_threshold {
                self.trip(&mut inner, "failure threshold reached");
            }
        } else {
            inner.consecutive_failures = 0;
        }
    }

    fn trip(&self, inner: &mut BreakerInner, reason: &str) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        self.metrics.set_breaker_open(true);
        warn!(
            reason,
            consecutive_failures = inner.consecutive_failures,
            recovery_secs = self.config.recovery_timeout.as_secs_f64(),
            "Circuit breaker opened"
        );
    }
}

/// Admission ticket for one call.
///
/// If a trial call's future is dropped before it completes (request deadline),
/// the trial is recorded as failed so the half-open slot is released.
struct Permit<'a, E> {
    breaker: &'a CircuitBreaker<E>,
    trial: bool,
    completed: bool,
}

impl<E> Permit<'_, E> {
    fn complete(mut self, failed: bool) {
        self.completed = true;
        self.breaker.record(self.trial, failed);
    }
}

impl<E> Drop for Permit<'_, E> {
    fn drop(&mut self) {
        if !self.completed && self.trial {
            self.breaker.record(true, true);
        }
    }
}
