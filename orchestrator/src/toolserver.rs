//! HTTP client for the gateway's tool surface.

use std::time::Duration;

use serde_json::{json, Map, Value};

use haven_core::error::ErrorKind;
use haven_core::tool::{ToolDescriptor, ToolResult};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ToolServerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ToolServerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, String> {
        let response = self
            .http
            .get(format!("{}/v1/tools/list", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("tool server answered HTTP {}", response.status()));
        }
        response.json().await.map_err(|err| err.to_string())
    }

    /// Execute a tool. Transport failures come back as an unavailable-kind
    /// result, so callers always have a `ToolResult` to work with.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        session_id: &str,
    ) -> ToolResult {
        let payload = json!({
            "tool_name": tool_name,
            "arguments": arguments,
            "session_id": session_id,
        });

        let response = match self
            .http
            .post(format!("{}/v1/tools/call", self.base_url))
            .timeout(CALL_TIMEOUT)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(tool = tool_name, error = %err, "tool server unreachable");
                return ToolResult::error(
                    ErrorKind::EffectorUnavailable,
                    format!("Tool server unreachable: {err}"),
                );
            }
        };

        if !response.status().is_success() {
            return ToolResult::error(
                ErrorKind::UpstreamRejected,
                format!("Tool server answered HTTP {}", response.status()),
            );
        }

        match response.json::<ToolResult>().await {
            Ok(result) => result,
            Err(err) => ToolResult::error(
                ErrorKind::EffectorFailed,
                format!("Tool server returned an unreadable result: {err}"),
            ),
        }
    }

    /// Reachability probe for the health endpoint.
    pub async fn health_status(&self) -> &'static str {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => "connected",
            Ok(_) => "error",
            Err(_) => "disconnected",
        }
    }
}
