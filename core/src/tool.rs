use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::ErrorKind;

/// A tool the gateway publishes to callers. Immutable after registration.
///
/// `parameters` is a JSON-schema-shaped object declaring required and optional
/// keys with primitive types. The description is consumed by the LLM when the
/// orchestrator builds its tool prompt, so it is written for a model, not a
/// human.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolDescriptor {
    /// Unique tool name (e.g. "ping_host").
    pub name: String,
    /// What the tool does and when to use it.
    pub description: String,
    /// JSON-schema-shaped parameter declaration.
    #[schema(value_type = Object)]
    pub parameters: Value,
}

/// A single tool invocation as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolCallRequest {
    /// The name of the tool to execute.
    pub tool_name: String,
    /// Raw arguments, validated against the descriptor before dispatch.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub arguments: Map<String, Value>,
    /// Opaque identifier scoping caching and logging.
    pub session_id: String,
}

/// The dispatcher's answer to a tool call: success with data, or an error
/// with a kind from the closed set. Never both, never neither.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        #[schema(value_type = Object)]
        data: Value,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Option<Object>)]
        detail: Option<Value>,
    },
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        ToolResult::Success { data }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ToolResult::Error {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn error_with_detail(kind: ErrorKind, message: impl Into<String>, detail: Value) -> Self {
        ToolResult::Error {
            kind,
            message: message.into(),
            detail: Some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// The error kind, if this is an error result.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Error { kind, .. } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_result_is_status_tagged() {
        let result = ToolResult::success(json!({"host": "example.com"}));
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["status"], "success");
        assert_eq!(wire["data"]["host"], "example.com");
        assert!(wire.get("kind").is_none());
    }

    #[test]
    fn error_result_carries_kind_and_message() {
        let result = ToolResult::error(ErrorKind::UnknownTool, "Unknown tool 'frobnicate'");
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["status"], "error");
        assert_eq!(wire["kind"], "unknown_tool");
        assert_eq!(wire["message"], "Unknown tool 'frobnicate'");
        assert!(wire.get("detail").is_none());
    }

    #[test]
    fn error_detail_round_trips() {
        let result = ToolResult::error_with_detail(
            ErrorKind::UpstreamRejected,
            "HA answered 404",
            json!({"status_code": 404}),
        );
        let wire = serde_json::to_string(&result).unwrap();
        let parsed: ToolResult = serde_json::from_str(&wire).unwrap();
        match parsed {
            ToolResult::Error { kind, detail, .. } => {
                assert_eq!(kind, ErrorKind::UpstreamRejected);
                assert_eq!(detail.unwrap()["status_code"], 404);
            }
            ToolResult::Success { .. } => panic!("expected error variant"),
        }
    }

    #[test]
    fn call_request_defaults_to_empty_arguments() {
        let parsed: ToolCallRequest =
            serde_json::from_str(r#"{"tool_name": "get_network_time", "session_id": "s1"}"#)
                .unwrap();
        assert!(parsed.arguments.is_empty());
        assert_eq!(parsed.session_id, "s1");
    }
}
