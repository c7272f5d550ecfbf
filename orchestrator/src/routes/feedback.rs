use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::interaction::Feedback;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feedback", post(submit_feedback))
        .route(
            "/interaction/{session_id}/{interaction_id}",
            get(get_interaction),
        )
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub interaction_id: String,
    pub session_id: String,
    pub feedback: String,
}

/// Thumbs-up promotes the interaction to the durable store and removes its
/// expiry; thumbs-down records a negative-feedback row and deletes the
/// ephemeral entry. Anything else is an argument error.
pub async fn submit_feedback(
    State(state): State<AppState>,
    AppJson(request): AppJson<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    let feedback = match request.feedback.as_str() {
        "thumbs_up" => Feedback::ThumbsUp,
        "thumbs_down" => Feedback::ThumbsDown,
        other => {
            return Err(AppError::Validation {
                message: format!(
                    "feedback must be 'thumbs_up' or 'thumbs_down' (got '{other}')"
                ),
            });
        }
    };

    if !state.interactions.is_available() {
        return Err(AppError::Unavailable {
            message: "the interaction store is not available for feedback".to_string(),
        });
    }

    let Some(mut interaction) = state
        .interactions
        .fetch(&request.session_id, &request.interaction_id)
        .await
    else {
        return Err(AppError::NotFound {
            resource: format!("interaction {}", request.interaction_id),
        });
    };

    interaction.feedback = feedback;

    match feedback {
        Feedback::ThumbsUp => {
            // Durable copy first; only then drop the expiry so a failed copy
            // can be retried against a still-live entry.
            state
                .durable
                .save_interaction(&interaction)
                .await
                .map_err(AppError::Internal)?;
            state
                .interactions
                .persist(&interaction)
                .await
                .map_err(AppError::Internal)?;
            tracing::info!(interaction_id = %interaction.interaction_id, "interaction promoted on thumbs_up");
            Ok(Json(json!({
                "status": "success",
                "message": "Feedback recorded. This interaction will be kept.",
            })))
        }
        Feedback::ThumbsDown => {
            state
                .durable
                .save_negative_feedback(&interaction, "user gave thumbs down")
                .await
                .map_err(AppError::Internal)?;
            state
                .interactions
                .delete(&request.session_id, &request.interaction_id)
                .await
                .map_err(AppError::Internal)?;
            tracing::info!(interaction_id = %interaction.interaction_id, "interaction removed on thumbs_down");
            Ok(Json(json!({
                "status": "success",
                "message": "Feedback recorded. This interaction has been removed.",
            })))
        }
        Feedback::None => unreachable!("parsed above"),
    }
}

/// Fetch a logged interaction for the debug UI.
pub async fn get_interaction(
    State(state): State<AppState>,
    Path((session_id, interaction_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    if !state.interactions.is_available() {
        return Err(AppError::Unavailable {
            message: "the interaction store is not available".to_string(),
        });
    }

    match state.interactions.fetch(&session_id, &interaction_id).await {
        Some(interaction) => Ok(Json(
            serde_json::to_value(interaction).map_err(|err| AppError::Internal(err.to_string()))?,
        )),
        None => Err(AppError::NotFound {
            resource: format!("interaction {interaction_id}"),
        }),
    }
}
