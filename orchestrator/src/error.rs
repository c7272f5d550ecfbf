use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// HTTP-surface error type for the orchestrator.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request (400).
    Validation { message: String },
    /// Missing resource (404).
    NotFound { resource: String },
    /// A required backing service is down (503).
    Unavailable { message: String },
    /// Everything else (500). The message is logged, not returned.
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::Validation { message } => {
                (StatusCode::BAD_REQUEST, "invalid_arguments", message)
            }
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{resource} not found"),
            ),
            AppError::Unavailable { message } => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
            }
            AppError::Internal(message) => {
                tracing::error!("internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };
        (
            status,
            Json(json!({ "error": error, "message": message })),
        )
            .into_response()
    }
}
