use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe. No external provider ping: the classifier
/// and moderator already fail soft (heuristic fallback / `ExternalAgentError`),
/// so a provider outage shouldn't flip this endpoint red.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "git_sha": env!("STORYLINE_GIT_SHA"),
        "bind": state.config.server.bind,
        "port": state.config.server.port,
    }))
}
