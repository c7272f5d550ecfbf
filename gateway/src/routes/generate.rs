//! Reserved generation endpoint. The LLM loop lives in the orchestrator; this
//! surface answers with a scaffold response so callers can probe the shape.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/generate", post(generate))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct GenerateRequest {
    pub session_id: String,
    pub prompt: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct GenerateResponse {
    pub response_text: String,
    pub is_cached: bool,
}

/// Reserved — mock response only.
#[utoipa::path(
    post,
    path = "/v1/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Mock generation response", body = GenerateResponse)
    ),
    tag = "tools"
)]
pub async fn generate(
    State(state): State<AppState>,
    AppJson(request): AppJson<GenerateRequest>,
) -> Json<GenerateResponse> {
    let tool_count = state.dispatcher.list_tools().len();
    Json(GenerateResponse {
        response_text: format!(
            "The gateway is running. You asked about: '{}'. {tool_count} tools are available.",
            request.prompt
        ),
        is_cached: false,
    })
}
