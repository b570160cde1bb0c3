// HTTP router tests: relay and scoring service, driven in-process with
// tower's `oneshot` (no sockets).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use toxguard::error::{AlertError, ScoreError};
use toxguard::metrics::{Metrics, VerdictLabel};
use toxguard::moderation::{AlertSink, ModerationPipeline, PipelineConfig};
use toxguard::resilience::BreakerConfig;
use toxguard::toxicity::api::ScoreResponse;
use toxguard::toxicity::scorer::Scorer;
use toxguard::toxicity::traits::{Category, CategoryScores, ScoreProvider};
use toxguard::web::{relay_router, scorer_router, RelayState, ScorerState};

struct FakeProvider {
    failing: AtomicBool,
    calls: AtomicU32,
    last_text: Mutex<String>,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
            last_text: Mutex::new(String::new()),
        })
    }
}

#[async_trait]
impl ScoreProvider for FakeProvider {
    async fn score_text(&self, text: &str) -> Result<CategoryScores, ScoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = text.to_string();
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScoreError::Transport("connection refused".to_string()));
        }
        // Anything mentioning "hurt" is a threat; everything else is benign.
        if text.contains("hurt") {
            Ok(CategoryScores::from_pairs([
                (Category::Toxicity, 0.92),
                (Category::Threat, 0.81),
            ]))
        } else {
            Ok(CategoryScores::from_pairs([(Category::Toxicity, 0.01)]))
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<String>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send_alert(&self, _destination_id: &str, text: &str) -> Result<(), AlertError> {
        self.alerts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Relay {
    router: Router,
    provider: Arc<FakeProvider>,
    sink: Arc<RecordingSink>,
    metrics: Arc<Metrics>,
}

fn relay(failure_threshold: u32) -> Relay {
    let provider = FakeProvider::new();
    let sink = Arc::new(RecordingSink::default());
    let metrics = Arc::new(Metrics::new());
    let pipeline = ModerationPipeline::new(
        Scorer::new(provider.clone(), Duration::from_secs(5)),
        BreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_secs(30),
        },
        sink.clone(),
        Arc::clone(&metrics),
        PipelineConfig::new("-100"),
    );
    let router = relay_router(RelayState {
        pipeline: Arc::new(pipeline),
        metrics: Arc::clone(&metrics),
    });
    Relay {
        router,
        provider,
        sink,
        metrics,
    }
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn text_update(text: &str) -> String {
    serde_json::json!({
        "update_id": 1,
        "message": {
            "message_id": 7,
            "chat": { "id": -42 },
            "from": { "id": 99, "username": "bob" },
            "text": text,
        }
    })
    .to_string()
}

// ============================================================
// Relay
// ============================================================

#[tokio::test]
async fn webhook_alerts_on_toxic_message() {
    let relay = relay(5);

    let response = relay
        .router
        .clone()
        .oneshot(post_json("/webhook", &text_update("I will hurt you")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"ok":true}"#);
    let alerts = relay.sink.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("@bob"));
    assert!(alerts[0].contains("toxicity, threat"));
}

#[tokio::test]
async fn webhook_acknowledges_benign_and_textless_updates() {
    let relay = relay(5);

    let benign = relay
        .router
        .clone()
        .oneshot(post_json("/webhook", &text_update("good morning")))
        .await
        .unwrap();
    assert_eq!(benign.status(), StatusCode::OK);

    let sticker = r#"{"update_id": 2, "message": {"message_id": 8, "chat": {"id": -42},
                     "sticker": {"file_id": "abc"}}}"#;
    let textless = relay
        .router
        .clone()
        .oneshot(post_json("/webhook", sticker))
        .await
        .unwrap();
    assert_eq!(textless.status(), StatusCode::OK);

    assert_eq!(relay.provider.calls.load(Ordering::SeqCst), 1);
    assert!(relay.sink.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn webhook_acknowledges_malformed_body() {
    let relay = relay(5);

    let response = relay
        .router
        .clone()
        .oneshot(post_json("/webhook", "this is not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"ok":true}"#);
    assert_eq!(relay.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn webhook_fails_open_when_scoring_is_down() {
    let relay = relay(1);
    relay.provider.failing.store(true, Ordering::SeqCst);

    for _ in 0..3 {
        let response = relay
            .router
            .clone()
            .oneshot(post_json("/webhook", &text_update("I will hurt you")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // One real attempt trips the breaker; the rest are rejected.
    assert_eq!(relay.provider.calls.load(Ordering::SeqCst), 1);
    assert!(relay.sink.alerts.lock().unwrap().is_empty());
    assert_eq!(relay.metrics.messages_processed(VerdictLabel::Error), 3);

    // Health stays green while the breaker is open.
    let health = relay.router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_string(health).await, r#"{"ok":true}"#);
}

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_and_http_metrics() {
    let relay = relay(5);

    relay
        .router
        .clone()
        .oneshot(post_json("/webhook", &text_update("hello")))
        .await
        .unwrap();
    assert_eq!(relay.metrics.http_requests("POST", "/webhook", 200), 1);

    let response = relay.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("messages_processed_total{verdict=\"non_toxic\"} 1"));
    assert!(body.contains("endpoint=\"/webhook\""));
    assert!(body.contains("circuit_breaker_open 0"));
    assert!(body.contains("scoring_call_duration_seconds_count 1"));
}

#[tokio::test]
async fn unknown_routes_are_not_counted() {
    let relay = relay(5);

    let response = relay
        .router
        .clone()
        .oneshot(get("/does-not-exist"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!relay.metrics.render().contains("/does-not-exist"));
}

// ============================================================
// Scoring service
// ============================================================

fn scorer_service() -> (Router, Arc<FakeProvider>, Arc<Metrics>) {
    let provider = FakeProvider::new();
    let metrics = Arc::new(Metrics::new());
    let router = scorer_router(ScorerState {
        provider: provider.clone(),
        metrics: Arc::clone(&metrics),
    });
    (router, provider, metrics)
}

#[tokio::test]
async fn analyze_returns_verdict() {
    let (router, _provider, metrics) = scorer_service();

    let response = router
        .oneshot(post_json("/analyze", r#"{"text": "I will hurt you"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ScoreResponse = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(body.toxic);
    assert_eq!(body.toxicity, 0.92);
    assert_eq!(body.reasons, vec!["toxicity", "threat"]);
    assert_eq!(body.labels.len(), 6);
    assert_eq!(body.labels["insult"], 0.0);
    assert_eq!(metrics.inference_count(), 1);
}

#[tokio::test]
async fn analyze_truncates_long_text() {
    let (router, provider, _metrics) = scorer_service();
    let long_text = "x".repeat(2000);
    let request = serde_json::json!({ "text": long_text }).to_string();

    let response = router.oneshot(post_json("/analyze", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(provider.last_text.lock().unwrap().chars().count(), 512);
}

#[tokio::test]
async fn analyze_reports_provider_failure_as_503() {
    let (router, provider, _metrics) = scorer_service();
    provider.failing.store(true, Ordering::SeqCst);

    let response = router
        .oneshot(post_json("/analyze", r#"{"text": "hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn scorer_health_and_metrics() {
    let (router, _provider, _metrics) = scorer_service();

    let health = router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let metrics = router.oneshot(get("/metrics")).await.unwrap();
    let body = body_string(metrics).await;
    assert!(body.contains("inference_duration_seconds_count 0"));
    assert!(body.contains("endpoint=\"/healthz\""));
}
