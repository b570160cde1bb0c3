// POST /analyze: the scoring service endpoint.
//
// Truncates the text, runs the local provider, and applies the fixed service
// threshold. A provider failure is a 503 so callers can never mistake it for
// a non-toxic verdict.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info};

use crate::output::truncate_chars;
use crate::scoring::{decide, DEFAULT_THRESHOLD};
use crate::toxicity::api::{ScoreRequest, ScoreResponse};
use crate::toxicity::scorer::normalize;
use crate::toxicity::traits::ScoreProvider;
use crate::web::{api_error, ScorerState};

pub async fn analyze(
    State(state): State<ScorerState>,
    Json(request): Json<ScoreRequest>,
) -> Response {
    let text = normalize(&request.text);

    let started = Instant::now();
    let result = state.provider.score_text(text).await;
    let elapsed = started.elapsed();
    state.metrics.observe_inference(elapsed);

    match result {
        Ok(categories) => {
            let verdict = decide(&categories, DEFAULT_THRESHOLD);
            info!(
                toxic = verdict.toxic,
                toxicity = verdict.primary_score,
                reasons = %verdict.reasons_label(),
                latency_ms = elapsed.as_millis() as u64,
                text_preview = %truncate_chars(text, 50),
                "Analyzed text"
            );
            Json(ScoreResponse::from_verdict(&verdict)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Inference failed");
            api_error(StatusCode::SERVICE_UNAVAILABLE, &e.to_string())
        }
    }
}
