use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use haven_core::tool::{ToolCallRequest, ToolDescriptor, ToolResult};

use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tools/list", get(list_tools))
        .route("/v1/tools/call", post(call_tool))
}

/// List every registered tool descriptor.
#[utoipa::path(
    get,
    path = "/v1/tools/list",
    responses(
        (status = 200, description = "Registered tools", body = [ToolDescriptor])
    ),
    tag = "tools"
)]
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.dispatcher.list_tools())
}

/// Execute a tool call. Always answers 200 with a `ToolResult`; failures are
/// typed errors inside the result, not HTTP errors.
#[utoipa::path(
    post,
    path = "/v1/tools/call",
    request_body = ToolCallRequest,
    responses(
        (status = 200, description = "Tool execution result", body = ToolResult)
    ),
    tag = "tools"
)]
pub async fn call_tool(
    State(state): State<AppState>,
    AppJson(request): AppJson<ToolCallRequest>,
) -> Json<ToolResult> {
    let result = state
        .dispatcher
        .call(&request.tool_name, &request.arguments, &request.session_id)
        .await;
    Json(result)
}
