// HTTP servers: the relay (Telegram webhook intake) and the scoring service.
//
// Both are small Axum routers sharing the same ambient pieces: a health check
// that never consults the breaker, Prometheus text exposition of the process's
// Metrics handle, request metrics middleware on every matched route, and
// tower-http request tracing.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::Metrics;
use crate::moderation::ModerationPipeline;
use crate::toxicity::traits::ScoreProvider;

pub mod handlers;
pub mod middleware;

/// State for the relay router.
#[derive(Clone)]
pub struct RelayState {
    pub pipeline: Arc<ModerationPipeline>,
    pub metrics: Arc<Metrics>,
}

/// State for the scoring service router.
#[derive(Clone)]
pub struct ScorerState {
    pub provider: Arc<dyn ScoreProvider>,
    pub metrics: Arc<Metrics>,
}

impl FromRef<RelayState> for Arc<Metrics> {
    fn from_ref(state: &RelayState) -> Self {
        state.metrics.clone()
    }
}

impl FromRef<ScorerState> for Arc<Metrics> {
    fn from_ref(state: &ScorerState) -> Self {
        state.metrics.clone()
    }
}

/// Routes for `toxguard serve`.
pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route("/webhook", post(handlers::webhook::receive_update))
        .route("/healthz", get(healthz))
        .route("/metrics", get(handlers::metrics::render_metrics))
        .route_layer(axum::middleware::from_fn_with_state(
            state.metrics.clone(),
            middleware::track_http_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes for `toxguard scorer`.
pub fn scorer_router(state: ScorerState) -> Router {
    Router::new()
        .route("/analyze", post(handlers::analyze::analyze))
        .route("/healthz", get(healthz))
        .route("/metrics", get(handlers::metrics::render_metrics))
        .route_layer(axum::middleware::from_fn_with_state(
            state.metrics.clone(),
            middleware::track_http_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the relay and block until it exits.
pub async fn run_relay(state: RelayState, port: u16, bind: &str) -> Result<()> {
    let app = relay_router(state);
    let addr = format!("{bind}:{port}");
    info!("toxguard relay listening on http://{addr}");
    serve(app, &addr).await
}

/// Start the scoring service and block until it exits.
pub async fn run_scorer(state: ScorerState, port: u16, bind: &str) -> Result<()> {
    let app = scorer_router(state);
    let addr = format!("{bind}:{port}");
    info!("toxguard scoring service listening on http://{addr}");
    serve(app, &addr).await
}

async fn serve(app: Router, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Liveness check. Answers 200 whatever the breaker is doing.
async fn healthz() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "ok": true }))
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
