//! Home Assistant synchronizer: a WebSocket subscriber plus REST caller that
//! keeps a near-real-time read model of HA entities, executes commands with
//! write-through cache invalidation, and resolves human device names onto
//! entity identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use haven_core::error::ErrorKind;
use haven_core::tool::ToolResult;

pub mod cache;
pub mod ops;
pub mod resolve;
pub mod service;
pub mod ws;

pub use service::HomeAssistant;

/// A single HA entity as reported by the REST or event API. Entities are
/// created by HA and updated by HA-sourced events; locally they are only ever
/// cached and evicted, never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl EntityState {
    /// The domain prefix before the dot (`sensor`, `light`, `switch`, ...).
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("")
    }

    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }

    pub fn brightness(&self) -> Option<u64> {
        self.attributes.get("brightness").and_then(Value::as_u64)
    }
}

/// Failures on the HA seam. Each maps onto exactly one kind from the closed
/// dispatcher taxonomy.
#[derive(Debug)]
pub enum HaError {
    /// No token at startup; every HA tool reports this with a stable message.
    NotConfigured,
    /// HA could not be reached at all (connect error, transport failure).
    Unreachable(String),
    /// HA answered with a 4xx/5xx status.
    Rejected { status: u16, body: String },
    /// HA answered with a payload we could not decode.
    Decode(String),
}

impl HaError {
    pub fn into_tool_result(self) -> ToolResult {
        match self {
            HaError::NotConfigured => ToolResult::error(
                ErrorKind::EffectorUnavailable,
                "Home Assistant is not configured. Set HA_URL and HA_TOKEN.",
            ),
            HaError::Unreachable(message) => ToolResult::error(
                ErrorKind::EffectorUnavailable,
                format!("Home Assistant is not reachable: {message}"),
            ),
            HaError::Rejected { status, body } => ToolResult::error_with_detail(
                ErrorKind::UpstreamRejected,
                format!("Home Assistant rejected the request with HTTP {status}"),
                json!({ "status_code": status, "body": body }),
            ),
            HaError::Decode(message) => ToolResult::error(
                ErrorKind::EffectorFailed,
                format!("Home Assistant returned an unreadable payload: {message}"),
            ),
        }
    }
}

impl std::fmt::Display for HaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaError::NotConfigured => write!(f, "Home Assistant is not configured"),
            HaError::Unreachable(message) => write!(f, "Home Assistant unreachable: {message}"),
            HaError::Rejected { status, .. } => write!(f, "Home Assistant rejected: HTTP {status}"),
            HaError::Decode(message) => write!(f, "Home Assistant payload decode: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(entity_id: &str, friendly: &str) -> EntityState {
        let mut attributes = Map::new();
        attributes.insert("friendly_name".to_string(), json!(friendly));
        EntityState {
            entity_id: entity_id.to_string(),
            state: "on".to_string(),
            attributes,
            last_changed: None,
            last_updated: None,
        }
    }

    #[test]
    fn domain_is_prefix_before_dot() {
        assert_eq!(entity("light.kitchen_island", "Kitchen Island").domain(), "light");
        assert_eq!(entity("binary_sensor.door", "Door").domain(), "binary_sensor");
    }

    #[test]
    fn friendly_name_falls_back_to_entity_id() {
        let mut e = entity("switch.coffee_maker", "Coffee Maker");
        assert_eq!(e.friendly_name(), "Coffee Maker");
        e.attributes.clear();
        assert_eq!(e.friendly_name(), "switch.coffee_maker");
    }

    #[test]
    fn rejected_error_surfaces_status_code() {
        let result = HaError::Rejected {
            status: 404,
            body: "not found".to_string(),
        }
        .into_tool_result();
        match result {
            ToolResult::Error { kind, detail, .. } => {
                assert_eq!(kind, ErrorKind::UpstreamRejected);
                assert_eq!(detail.unwrap()["status_code"], 404);
            }
            ToolResult::Success { .. } => panic!("expected error"),
        }
    }

    #[test]
    fn not_configured_message_is_stable() {
        let a = HaError::NotConfigured.into_tool_result();
        let b = HaError::NotConfigured.into_tool_result();
        assert_eq!(serde_json::to_value(a).unwrap(), serde_json::to_value(b).unwrap());
    }
}
