// Process metrics with Prometheus text exposition.
//
// One `Metrics` value is built at startup and shared as `Arc<Metrics>` by the
// HTTP layer, the moderation pipeline and the circuit breaker. Counters are
// plain atomics where there are no labels; labeled families keep a small map
// behind a mutex. `render()` produces the text served on GET /metrics.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{ErrorKind, ScoreError};

/// Latency buckets in seconds (the usual Prometheus client defaults).
pub const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Label value for `messages_processed_total{verdict=...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictLabel {
    Toxic,
    NonToxic,
    Error,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Toxic => "toxic",
            VerdictLabel::NonToxic => "non_toxic",
            VerdictLabel::Error => "error",
        }
    }
}

/// Result of one attempted call to the scoring dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// `None` on success.
    pub error_kind: Option<ErrorKind>,
    /// `error_type` label, present on failure.
    pub error_label: Option<String>,
    pub latency: Duration,
}

impl CallOutcome {
    pub fn success(latency: Duration) -> Self {
        Self {
            error_kind: None,
            error_label: None,
            latency,
        }
    }

    pub fn failure(error: &ScoreError, latency: Duration) -> Self {
        Self {
            error_kind: Some(error.kind()),
            error_label: Some(error.metric_label()),
            latency,
        }
    }
}

/// Shared observability handle.
pub struct Metrics {
    http_requests: CounterVec,
    http_duration: HistogramVec,
    scoring_duration: HistogramVec,
    scoring_errors: CounterVec,
    breaker_open: AtomicU64,
    messages_processed: CounterVec,
    alert_failures: AtomicU64,
    inference_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            http_requests: CounterVec::new(
                "http_requests_total",
                "Total HTTP requests",
                &["method", "endpoint", "status"],
            ),
            http_duration: HistogramVec::new(
                "http_request_duration_seconds",
                "HTTP request duration",
                &["method", "endpoint"],
            ),
            scoring_duration: HistogramVec::new(
                "scoring_call_duration_seconds",
                "Scoring service call duration",
                &[],
            ),
            scoring_errors: CounterVec::new(
                "scoring_errors_total",
                "Scoring service errors",
                &["error_type"],
            ),
            breaker_open: AtomicU64::new(0),
            messages_processed: CounterVec::new(
                "messages_processed_total",
                "Total messages processed",
                &["verdict"],
            ),
            alert_failures: AtomicU64::new(0),
            inference_duration: HistogramVec::new(
                "inference_duration_seconds",
                "Toxicity model inference duration",
                &[],
            ),
        }
    }

    pub fn record_http_request(
        &self,
        method: &str,
        endpoint: &str,
        status: u16,
        elapsed: Duration,
    ) {
        let status = status.to_string();
        self.http_requests.inc(&[method, endpoint, status.as_str()]);
        self.http_duration
            .observe(&[method, endpoint], elapsed.as_secs_f64());
    }

    /// Record latency and, on failure, the error label of one scoring attempt.
    pub fn record_scoring_call(&self, outcome: &CallOutcome) {
        self.scoring_duration.observe(&[], outcome.latency.as_secs_f64());
        if let Some(label) = &outcome.error_label {
            self.scoring_errors.inc(&[label.as_str()]);
        }
    }

    pub fn set_breaker_open(&self, open: bool) {
        self.breaker_open.store(u64::from(open), Ordering::Relaxed);
    }

    pub fn record_message(&self, verdict: VerdictLabel) {
        self.messages_processed.inc(&[verdict.as_str()]);
    }

    pub fn record_alert_failure(&self) {
        self.alert_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_inference(&self, elapsed: Duration) {
        self.inference_duration.observe(&[], elapsed.as_secs_f64());
    }

    pub fn http_requests(&self, method: &str, endpoint: &str, status: u16) -> u64 {
        let status = status.to_string();
        self.http_requests.get(&[method, endpoint, status.as_str()])
    }

    pub fn scoring_errors(&self, error_type: &str) -> u64 {
        self.scoring_errors.get(&[error_type])
    }

    /// Number of scoring attempts observed by the latency histogram.
    pub fn scoring_calls(&self) -> u64 {
        self.scoring_duration.count(&[])
    }

    pub fn breaker_open(&self) -> bool {
        self.breaker_open.load(Ordering::Relaxed) == 1
    }

    pub fn messages_processed(&self, verdict: VerdictLabel) -> u64 {
        self.messages_processed.get(&[verdict.as_str()])
    }

    pub fn alert_failures(&self) -> u64 {
        self.alert_failures.load(Ordering::Relaxed)
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_duration.count(&[])
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.http_requests.render(&mut out);
        self.http_duration.render(&mut out);
        self.scoring_duration.render(&mut out);
        self.scoring_errors.render(&mut out);
        render_scalar(
            &mut out,
            "circuit_breaker_open",
            "Circuit breaker state (1=open, 0=closed)",
            "gauge",
            self.breaker_open.load(Ordering::Relaxed),
        );
        self.messages_processed.render(&mut out);
        render_scalar(
            &mut out,
            "alert_dispatch_failures_total",
            "Alert deliveries that failed",
            "counter",
            self.alert_failures.load(Ordering::Relaxed),
        );
        self.inference_duration.render(&mut out);
        out
    }
}

// --- Metric families ---

struct CounterVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    values: Mutex<BTreeMap<Vec<String>, u64>>,
}

impl CounterVec {
    fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            labels,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    fn inc(&self, label_values: &[&str]) {
        let key = owned_key(label_values);
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        *values.entry(key).or_insert(0) += 1;
    }

    fn get(&self, label_values: &[&str]) -> u64 {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(&owned_key(label_values)).copied().unwrap_or(0)
    }

    fn render(&self, out: &mut String) {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} counter", self.name);
        for (key, value) in values.iter() {
            let _ = writeln!(
                out,
                "{}{} {}",
                self.name,
                format_labels(self.labels, key, None),
                value
            );
        }
    }
}

#[derive(Clone)]
struct HistogramData {
    buckets: [u64; DEFAULT_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl HistogramData {
    fn new() -> Self {
        Self {
            buckets: [0; DEFAULT_BUCKETS.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        for (bucket, bound) in self.buckets.iter_mut().zip(DEFAULT_BUCKETS) {
            if value <= bound {
                *bucket += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

struct HistogramVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    values: Mutex<BTreeMap<Vec<String>, HistogramData>>,
}

impl HistogramVec {
    fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        let mut values = BTreeMap::new();
        // Unlabeled histograms are exported from the start, even when empty.
        if labels.is_empty() {
            values.insert(Vec::new(), HistogramData::new());
        }
        Self {
            name,
            help,
            labels,
            values: Mutex::new(values),
        }
    }

    fn observe(&self, label_values: &[&str], value: f64) {
        let key = owned_key(label_values);
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values
            .entry(key)
            .or_insert_with(HistogramData::new)
            .observe(value);
    }

    fn count(&self, label_values: &[&str]) -> u64 {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values
            .get(&owned_key(label_values))
            .map(|data| data.count)
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String) {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} histogram", self.name);
        for (key, data) in values.iter() {
            for (bound, count) in DEFAULT_BUCKETS.iter().zip(data.buckets) {
                let le = bound.to_string();
                let _ = writeln!(
                    out,
                    "{}_bucket{} {}",
                    self.name,
                    format_labels(self.labels, key, Some(&le)),
                    count
                );
            }
            let _ = writeln!(
                out,
                "{}_bucket{} {}",
                self.name,
                format_labels(self.labels, key, Some("+Inf")),
                data.count
            );
            let labels = format_labels(self.labels, key, None);
            let _ = writeln!(out, "{}_sum{} {}", self.name, labels, data.sum);
            let _ = writeln!(out, "{}_count{} {}", self.name, labels, data.count);
        }
    }
}

fn owned_key(label_values: &[&str]) -> Vec<String> {
    label_values.iter().map(|v| v.to_string()).collect()
}

fn render_scalar(out: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

/// Build `{a="x",b="y"}` (plus an optional `le` bucket bound), or "" when empty.
fn format_labels(names: &[&str], values: &[String], le: Option<&str>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label(value)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
