use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use haven_core::tool::{ToolDescriptor, ToolResult};

use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/tools", get(list_tools))
        .route("/test-tool", post(test_tool))
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_session")]
    pub session_id: String,
}

fn default_session() -> String {
    "default".to_string()
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub tools_used: Vec<String>,
    pub session_id: String,
    pub timestamp: String,
    pub interaction_id: String,
    pub debug: Value,
}

/// Main chat endpoint: route the message, run tools, answer, log.
pub async fn chat(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChatRequest>,
) -> Json<ChatResponse> {
    let outcome = state
        .chat
        .process_message(&request.message, &request.session_id)
        .await;

    Json(ChatResponse {
        response: outcome.response,
        tools_used: outcome.tools_used,
        session_id: outcome.session_id,
        timestamp: outcome.timestamp.to_rfc3339(),
        interaction_id: outcome.interaction_id,
        debug: outcome.debug,
    })
}

/// List the tools the tool server advertises.
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.chat.available_tools().await)
}

#[derive(Deserialize)]
pub struct TestToolRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Direct tool passthrough, bypassing routing and logging.
pub async fn test_tool(
    State(state): State<AppState>,
    AppJson(request): AppJson<TestToolRequest>,
) -> Json<ToolResult> {
    Json(state.chat.test_tool(&request.tool_name, request.arguments).await)
}
