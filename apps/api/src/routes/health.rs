use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status and which optional integrations are enabled.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "memos",
        "integrations": {
            "database": state.config.database_url.is_some(),
            "google": state.google.is_some(),
            "push": state.config.vapid.is_some(),
            "summaries": state.summarizer.is_enabled(),
        }
    }))
}
