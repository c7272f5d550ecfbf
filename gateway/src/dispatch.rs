//! The dispatcher: single entry point for tool execution. Looks up the
//! descriptor, validates arguments into a typed call, runs the effector under
//! its per-tool deadline, and normalizes every outcome — including panics —
//! into a `ToolResult`.

use std::sync::Arc;

use serde_json::{Map, Value};

use haven_core::error::ErrorKind;
use haven_core::tool::{ToolDescriptor, ToolResult};

use crate::effectors::ntp::NtpEffector;
use crate::effectors::ping;
use crate::ha::{ops, HomeAssistant};
use crate::registry::{ToolRegistry, TypedCall};

/// Aborts the effector task when dropped. Aborting a finished task is a
/// no-op.
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    ntp: Arc<NtpEffector>,
    ha: Arc<HomeAssistant>,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, ntp: NtpEffector, ha: Arc<HomeAssistant>) -> Self {
        Self {
            registry: Arc::new(registry),
            ntp: Arc::new(ntp),
            ha,
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    /// Total over all inputs: every path ends in a `ToolResult`.
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
        session_id: &str,
    ) -> ToolResult {
        let Some(tool) = self.registry.get(tool_name) else {
            return ToolResult::error(
                ErrorKind::UnknownTool,
                format!("Unknown tool '{tool_name}'"),
            );
        };

        // Validation happens before any effector is touched.
        let typed = match tool.validate(arguments) {
            Ok(typed) => typed,
            Err(err) => return ToolResult::error(ErrorKind::InvalidArguments, err.message),
        };

        tracing::info!(tool = tool_name, session_id, "dispatching tool call");

        // The effector runs on its own task so a panic is contained to the
        // request. The guard aborts in-flight work on deadline expiry and
        // when the caller disconnects (the request future is dropped).
        let this = self.clone();
        let handle = tokio::spawn(async move { this.execute(typed).await });
        let _guard = AbortOnDrop(handle.abort_handle());

        match tokio::time::timeout(tool.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                tracing::error!(tool = tool_name, error = %join_err, "effector panicked");
                ToolResult::error(
                    ErrorKind::EffectorFailed,
                    format!("Tool '{tool_name}' failed unexpectedly"),
                )
            }
            Err(_) => ToolResult::error(
                ErrorKind::EffectorTimeout,
                format!(
                    "Tool '{tool_name}' timed out after {}s",
                    tool.timeout.as_secs()
                ),
            ),
        }
    }

    async fn execute(self, call: TypedCall) -> ToolResult {
        match call {
            TypedCall::NetworkTime => ToolResult::success(self.ntp.network_time().await),
            TypedCall::PingHost { hostname } => match ping::ping(&hostname).await {
                Ok(outcome) => ToolResult::success(outcome.into_value()),
                Err(message) => ToolResult::error(ErrorKind::EffectorFailed, message),
            },
            TypedCall::GetDeviceState {
                entity_id,
                domain,
                name_filter,
            } => {
                ops::get_device_state(
                    &self.ha,
                    entity_id.as_deref(),
                    domain.as_deref(),
                    name_filter.as_deref(),
                )
                .await
            }
            TypedCall::ControlLight {
                action,
                entity_id,
                name_filter,
                brightness,
            } => {
                ops::control_light(
                    &self.ha,
                    action,
                    entity_id.as_deref(),
                    name_filter.as_deref(),
                    brightness,
                )
                .await
            }
            TypedCall::ControlSwitch {
                action,
                entity_id,
                name_filter,
            } => {
                ops::control_switch(&self.ha, action, entity_id.as_deref(), name_filter.as_deref())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HaConfig, NtpConfig};
    use crate::ha::cache::StateCache;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let ha = HomeAssistant::new(
            HaConfig {
                url: "http://ha.internal".to_string(),
                token: String::new(),
                cache_ttl_secs: 30,
            },
            StateCache::disabled(30),
        );
        let ntp = NtpEffector::new(&NtpConfig {
            server: "pool.ntp.org".to_string(),
            backup_server: "time.google.com".to_string(),
            timeout_secs: 1,
            local_timezone: "UTC".to_string(),
        });
        Dispatcher::new(ToolRegistry::new(), ntp, ha)
    }

    fn args(raw: serde_json::Value) -> Map<String, Value> {
        raw.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn unknown_tool_is_a_typed_error() {
        let result = dispatcher().call("frobnicate", &Map::new(), "s1").await;
        assert_eq!(result.kind(), Some(ErrorKind::UnknownTool));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_effector() {
        // The hostile hostname is refused by the validator; if it reached the
        // effector a subprocess would be spawned.
        let result = dispatcher()
            .call("ping_host", &args(json!({"hostname": "bad host; ls"})), "s1")
            .await;
        assert_eq!(result.kind(), Some(ErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn missing_required_argument_names_the_key() {
        let result = dispatcher().call("ping_host", &Map::new(), "s1").await;
        match result {
            ToolResult::Error { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::InvalidArguments);
                assert!(message.contains("hostname"));
            }
            ToolResult::Success { .. } => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn ha_tools_report_unavailable_when_not_configured() {
        let result = dispatcher()
            .call(
                "ha_control_light",
                &args(json!({"action": "turn_on", "name_filter": "kitchen"})),
                "s1",
            )
            .await;
        assert_eq!(result.kind(), Some(ErrorKind::EffectorUnavailable));

        let result = dispatcher()
            .call("ha_get_device_state", &args(json!({"domain": "sensor"})), "s1")
            .await;
        assert_eq!(result.kind(), Some(ErrorKind::EffectorUnavailable));
    }

    #[tokio::test]
    async fn control_requires_a_target() {
        let result = dispatcher()
            .call("ha_control_switch", &args(json!({"action": "toggle"})), "s1")
            .await;
        match result {
            ToolResult::Error { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::InvalidArguments);
                assert!(message.contains("entity_id") && message.contains("name_filter"));
            }
            ToolResult::Success { .. } => panic!("expected error"),
        }
    }
}
