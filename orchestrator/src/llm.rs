//! LLM client and prompt construction. The model is a text-in/text-out
//! oracle: the first pass teaches it the `USE_TOOL` micro-protocol, the
//! second pass hands it tool results for synthesis.

use std::time::Duration;

use serde_json::{json, Value};

use haven_core::tool::ToolDescriptor;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// One prompt/response exchange, kept for the interaction log.
#[derive(Debug, Clone)]
pub struct LlmExchange {
    pub prompt: String,
    pub response: String,
}

#[derive(Clone)]
pub struct LlmClient {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: String) -> Result<LlmExchange, String> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATE_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|err| format!("LLM request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("LLM answered HTTP {}", response.status()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| format!("LLM returned an unreadable body: {err}"))?;
        let text = body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(LlmExchange {
            prompt,
            response: text,
        })
    }

    /// Reachability probe for the health endpoint.
    pub async fn health_status(&self) -> &'static str {
        match self
            .http
            .get(format!("{}/api/tags", self.base_url))
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

/// First-pass prompt: enumerate every tool and teach the call protocol.
pub fn tool_prompt(user_message: &str, tools: &[ToolDescriptor]) -> String {
    let mut tool_lines = String::new();
    for (index, tool) in tools.iter().enumerate() {
        let parameters =
            serde_json::to_string(&tool.parameters).unwrap_or_else(|_| "{}".to_string());
        tool_lines.push_str(&format!(
            "{}. {} - {}\n   parameters: {}\n",
            index + 1,
            tool.name,
            tool.description,
            parameters
        ));
    }

    format!(
        "You are an AI assistant with access to network and smart home tools. \
         Analyze the user's request and respond appropriately.\n\n\
         User request: \"{user_message}\"\n\n\
         Available tools:\n{tool_lines}\n\
         To call a tool, emit exactly one line per call, with nothing else on the line:\n\
         USE_TOOL:<tool_name>:<json-arguments>\n\n\
         Examples:\n\
         - USE_TOOL:get_network_time:{{}}\n\
         - USE_TOOL:ping_host:{{\"hostname\": \"example.com\"}}\n\
         - USE_TOOL:ha_get_device_state:{{\"domain\": \"sensor\", \"name_filter\": \"living room\"}}\n\
         - USE_TOOL:ha_control_light:{{\"action\": \"turn_on\", \"name_filter\": \"kitchen\"}}\n\
         - USE_TOOL:ha_control_switch:{{\"action\": \"turn_off\", \"name_filter\": \"coffee maker\"}}\n\n\
         If no tool is needed, answer the user conversationally instead.\n\n\
         Your response:"
    )
}

/// Second-pass prompt: original question plus the ordered tool transcript.
/// Failed calls appear with their error kind and message so the model can
/// explain the failure in plain language.
pub fn synthesis_prompt(user_message: &str, transcript: &str) -> String {
    format!(
        "Based on the tool results below, provide a helpful answer to the user's question. \
         If a tool reported an error, explain what went wrong in plain language; do not \
         invent results.\n\n\
         Tool results:\n{transcript}\n\n\
         User question: {user_message}\n\n\
         Provide a clear, helpful response using the information from the tools."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptors() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "get_network_time".to_string(),
                description: "Get the current time.".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolDescriptor {
                name: "ping_host".to_string(),
                description: "Ping a host.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "hostname": { "type": "string" } },
                    "required": ["hostname"]
                }),
            },
        ]
    }

    #[test]
    fn tool_prompt_enumerates_every_tool_with_schema() {
        let prompt = tool_prompt("what time is it?", &descriptors());
        assert!(prompt.contains("1. get_network_time"));
        assert!(prompt.contains("2. ping_host"));
        assert!(prompt.contains("\"required\":[\"hostname\"]"));
        assert!(prompt.contains("USE_TOOL:<tool_name>:<json-arguments>"));
        assert!(prompt.contains("what time is it?"));
    }

    #[test]
    fn synthesis_prompt_includes_transcript_and_question() {
        let prompt = synthesis_prompt("is example.com up?", "ping_host => reachable");
        assert!(prompt.contains("ping_host => reachable"));
        assert!(prompt.contains("is example.com up?"));
    }
}
