use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::dispatch::NoopSyncAgentDispatcher;
use crate::pipeline::{run_turn, TurnRequest};

/// POST /v1/turn — the single external entry point a channel adapter calls
/// with one utterance and gets back either a composed reply or a generation
/// job handle (§6).
pub async fn turn_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let result = match &state.sync_dispatcher {
        Some(dispatcher) => run_turn(&state, dispatcher.as_ref(), req).await,
        None => run_turn(&state, &NoopSyncAgentDispatcher, req).await,
    };

    match result {
        Ok(resp) => Ok(Json(serde_json::to_value(resp).unwrap_or_else(|_| json!({"success": false})))),
        Err(err) => {
            let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((status, Json(json!({"success": false, "error": err.code(), "message": err.to_string()}))))
        }
    }
}
