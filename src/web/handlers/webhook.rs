// POST /webhook: Telegram update intake.
//
// Always answers 200 {"ok": true}. Telegram redelivers any update that isn't
// acknowledged, and a redelivered update would be scored (and maybe alerted)
// twice. Updates that fail to parse or carry no text are acknowledged and
// dropped; scoring failures are the pipeline's business.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, warn};

use crate::telegram::Update;
use crate::web::RelayState;

pub async fn receive_update(State(state): State<RelayState>, body: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            let update_id = update.update_id;
            match update.into_message() {
                Some(message) => {
                    let outcome = state.pipeline.process(&message).await;
                    debug!(update_id, message_id = message.id, ?outcome, "Update processed");
                }
                None => debug!(update_id, "Update has no text, skipping"),
            }
        }
        Err(e) => warn!(error = %e, "Ignoring malformed update"),
    }

    Json(serde_json::json!({ "ok": true }))
}
