use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use haven_core::error::ErrorKind;
use haven_core::tool::ToolResult;

use crate::state::AppState;
use crate::transcribe::{self, TranscribeError};

pub fn router() -> Router<AppState> {
    Router::new().route("/transcribe", post(transcribe_upload))
}

/// Accept a multipart WAV upload (16 kHz / 16-bit / mono) and stream it to
/// the transcoder. The answer reuses the tool-result shape: success with the
/// transcript, or a typed error.
pub async fn transcribe_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Json<ToolResult> {
    let mut wav_bytes: Option<Vec<u8>> = None;
    let mut language: Option<String> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or_default().to_string();
                match name.as_str() {
                    "file" | "audio" => match field.bytes().await {
                        Ok(bytes) => wav_bytes = Some(bytes.to_vec()),
                        Err(err) => {
                            return Json(ToolResult::error(
                                ErrorKind::InvalidArguments,
                                format!("failed to read upload: {err}"),
                            ));
                        }
                    },
                    "language" => {
                        language = field.text().await.ok().filter(|v| !v.trim().is_empty());
                    }
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(err) => {
                return Json(ToolResult::error(
                    ErrorKind::InvalidArguments,
                    format!("malformed multipart upload: {err}"),
                ));
            }
        }
    }

    let Some(wav_bytes) = wav_bytes else {
        return Json(ToolResult::error(
            ErrorKind::InvalidArguments,
            "missing 'file' field with a WAV upload",
        ));
    };

    let audio = match transcribe::parse_wav(&wav_bytes) {
        Ok(audio) => audio,
        Err(message) => return Json(ToolResult::error(ErrorKind::InvalidArguments, message)),
    };

    match state
        .transcriber
        .transcribe(&audio, language.as_deref())
        .await
    {
        Ok(transcript) => {
            let mut payload = json!({
                "text": transcript.text,
                "duration_ms": transcript.duration_ms,
            });
            if let Some(warning) = transcript.warning {
                payload["warning"] = json!(warning);
            }
            Json(ToolResult::success(payload))
        }
        Err(TranscribeError::Unavailable(message)) => Json(ToolResult::error(
            ErrorKind::EffectorUnavailable,
            format!("transcoder unreachable: {message}"),
        )),
        Err(TranscribeError::Timeout) => Json(ToolResult::error(
            ErrorKind::EffectorTimeout,
            "transcoder stalled past the configured deadline",
        )),
        Err(TranscribeError::Protocol(message)) => Json(ToolResult::error(
            ErrorKind::EffectorFailed,
            format!("transcoder protocol error: {message}"),
        )),
    }
}
