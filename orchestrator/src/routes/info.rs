use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(service_info))
}

/// Root endpoint with basic service info and the endpoint map.
pub async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "haven-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.llm.model(),
        "endpoints": {
            "chat": "POST /chat",
            "health": "GET /health",
            "tools": "GET /tools",
            "test-tool": "POST /test-tool",
            "transcribe": "POST /transcribe",
            "interaction": "GET /interaction/{session_id}/{interaction_id}",
            "feedback": "POST /feedback",
        },
    }))
}
