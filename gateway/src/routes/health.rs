use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// State-cache backend: `connected` or `disconnected`.
    pub cache_backend: String,
    /// HA synchronizer: `not_configured`, `configured`, `connected`, or
    /// `disconnected`.
    pub home_assistant: String,
}

/// Health check — reports the cache backend and the HA synchronizer state.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        cache_backend: state.cache.backend_status().await.to_string(),
        home_assistant: state.ha.health().to_string(),
    })
}
