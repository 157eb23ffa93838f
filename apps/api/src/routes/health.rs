use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /api/health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "radar-api"
    }))
}

/// GET /api/keycheck
/// Reports whether a Gemini key is configured without revealing it.
pub async fn keycheck_handler(State(state): State<AppState>) -> Json<Value> {
    let key = state.config.gemini_api_key.as_deref().unwrap_or_default();
    let prefix = if key.is_empty() {
        String::new()
    } else {
        format!("{}...", key.chars().take(6).collect::<String>())
    };
    Json(json!({
        "present": !key.is_empty(),
        "prefix": prefix,
        "length": key.chars().count(),
    }))
}
