use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Reports reachability of the LLM backend and the tool server, plus the
/// active model.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let (llm_status, tool_server_status) =
        tokio::join!(state.llm.health_status(), state.tool_server.health_status());

    Json(json!({
        "status": "ok",
        "service": "haven-orchestrator",
        "llm": llm_status,
        "tool_server": tool_server_status,
        "model": state.llm.model(),
    }))
}
