use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Internal error type for the HTTP surface. Tool execution failures never
/// come through here — those are `ToolResult` errors with a 200 status; this
/// covers malformed requests before they reach the dispatcher.
#[derive(Debug)]
pub enum AppError {
    /// Request body problems (400).
    Validation { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Validation { message } = self;
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "validation_failed", "message": message })),
        )
            .into_response()
    }
}
