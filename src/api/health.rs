use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "inference-gateway is running",
        "backend": state.backend().id(),
        "models_count": config.models.allowed.len(),
        "default_model": config.models.default,
    }))
}
