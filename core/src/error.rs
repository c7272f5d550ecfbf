use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of error kinds the dispatcher may return. Nothing else ever
/// crosses the tool-call boundary — effector internals are normalized into
/// one of these before a response is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No tool with the requested name is registered.
    UnknownTool,
    /// A required argument is missing, mistyped, or out of range.
    InvalidArguments,
    /// The effector is not configured or its backend is not reachable.
    EffectorUnavailable,
    /// The effector did not complete within its per-tool deadline.
    EffectorTimeout,
    /// The effector ran and failed (including panics caught at the boundary).
    EffectorFailed,
    /// An upstream service answered with a rejection (HA 4xx/5xx).
    UpstreamRejected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::EffectorUnavailable => "effector_unavailable",
            ErrorKind::EffectorTimeout => "effector_timeout",
            ErrorKind::EffectorFailed => "effector_failed",
            ErrorKind::UpstreamRejected => "upstream_rejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EffectorTimeout).unwrap();
        assert_eq!(json, "\"effector_timeout\"");

        let parsed: ErrorKind = serde_json::from_str("\"upstream_rejected\"").unwrap();
        assert_eq!(parsed, ErrorKind::UpstreamRejected);
    }

    #[test]
    fn as_str_matches_wire_form() {
        for kind in [
            ErrorKind::UnknownTool,
            ErrorKind::InvalidArguments,
            ErrorKind::EffectorUnavailable,
            ErrorKind::EffectorTimeout,
            ErrorKind::EffectorFailed,
            ErrorKind::UpstreamRejected,
        ] {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, serde_json::Value::String(kind.as_str().to_string()));
        }
    }
}
