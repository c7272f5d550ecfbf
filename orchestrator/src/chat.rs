//! The chat service: executes routing decisions, drives the LLM tool loop,
//! renders replies, and writes the interaction log. Raw errors never reach
//! the chat reply — failures are rendered or narrated in plain language.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use haven_core::tool::{ToolDescriptor, ToolResult};

use crate::interaction::{
    new_interaction_id, Feedback, Interaction, InteractionStore, RoutingType,
};
use crate::llm::{synthesis_prompt, tool_prompt, LlmClient};
use crate::protocol::{self, ParseFailure};
use crate::routing::{self, RoutingDecision, Shortcut};
use crate::toolserver::ToolServerClient;

pub struct ChatOutcome {
    pub response: String,
    pub tools_used: Vec<String>,
    pub debug: Value,
    pub interaction_id: String,
    pub session_id: String,
    pub timestamp: chrono::DateTime<Utc>,
}

pub struct ChatService {
    tools: ToolServerClient,
    llm: LlmClient,
    interactions: InteractionStore,
    available_tools: RwLock<Vec<ToolDescriptor>>,
}

impl ChatService {
    pub fn new(tools: ToolServerClient, llm: LlmClient, interactions: InteractionStore) -> Self {
        Self {
            tools,
            llm,
            interactions,
            available_tools: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the tool list once at startup; a cold tool server is retried on
    /// the next message instead of failing boot.
    pub async fn initialize(&self) {
        match self.tools.list_tools().await {
            Ok(tools) => {
                tracing::info!(count = tools.len(), "loaded tools from the tool server");
                *self.available_tools.write().await = tools;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not load tools at startup");
            }
        }
    }

    pub async fn available_tools(&self) -> Vec<ToolDescriptor> {
        {
            let cached = self.available_tools.read().await;
            if !cached.is_empty() {
                return cached.clone();
            }
        }
        match self.tools.list_tools().await {
            Ok(tools) => {
                *self.available_tools.write().await = tools.clone();
                tools
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn llm_model(&self) -> &str {
        self.llm.model()
    }

    /// Direct tool passthrough for the `/test-tool` surface.
    pub async fn test_tool(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolResult {
        self.tools.call_tool(tool_name, arguments, "test-session").await
    }

    pub async fn process_message(&self, message: &str, session_id: &str) -> ChatOutcome {
        let interaction_id = new_interaction_id();
        let created_at = Utc::now();

        let (outcome, interaction) = match routing::route(message) {
            RoutingDecision::Shortcut(shortcut) => {
                self.run_shortcut(message, session_id, &interaction_id, shortcut)
                    .await
            }
            RoutingDecision::Llm => self.run_llm(message, session_id, &interaction_id).await,
        };

        let interaction = Interaction {
            created_at,
            ..interaction
        };
        self.interactions.record(&interaction).await;

        ChatOutcome {
            timestamp: created_at,
            ..outcome
        }
    }

    async fn run_shortcut(
        &self,
        message: &str,
        session_id: &str,
        interaction_id: &str,
        shortcut: Shortcut,
    ) -> (ChatOutcome, Interaction) {
        let result = self
            .tools
            .call_tool(shortcut.tool_name, shortcut.arguments.clone(), session_id)
            .await;

        let response = render_shortcut_reply(&shortcut, &result);
        let tools_used = vec![shortcut.tool_name.to_string()];
        let tool_results = json!({ shortcut.tool_name: result });

        let debug = json!({
            "routing": RoutingType::DirectShortcut.as_str(),
            "explanation": "Direct routing bypassed the LLM entirely",
            "user_message": message,
            "pattern_matched": shortcut.pattern,
            "keywords_detected": shortcut.keywords,
            "extracted_params": shortcut.extracted,
            "tool_call": {
                "tool_name": shortcut.tool_name,
                "arguments": shortcut.arguments,
            },
            "tool_results": tool_results,
            "why_no_llm": "the router detected a common pattern and called the tool directly",
        });

        let interaction = Interaction {
            interaction_id: interaction_id.to_string(),
            session_id: session_id.to_string(),
            user_message: message.to_string(),
            final_response: response.clone(),
            routing_type: RoutingType::DirectShortcut,
            tools_used: tools_used.clone(),
            tool_results: Some(tool_results),
            llm_payload: None,
            llm_response: None,
            debug_info: Some(debug.clone()),
            feedback: Feedback::None,
            created_at: Utc::now(),
        };

        (
            ChatOutcome {
                response,
                tools_used,
                debug,
                interaction_id: interaction_id.to_string(),
                session_id: session_id.to_string(),
                timestamp: interaction.created_at,
            },
            interaction,
        )
    }

    async fn run_llm(
        &self,
        message: &str,
        session_id: &str,
        interaction_id: &str,
    ) -> (ChatOutcome, Interaction) {
        let tools_list = self.available_tools().await;
        let first_prompt = tool_prompt(message, &tools_list);

        let first = match self.llm.generate(first_prompt).await {
            Ok(exchange) => exchange,
            Err(err) => {
                tracing::error!(error = %err, "LLM generation failed");
                return self.llm_unavailable(message, session_id, interaction_id, err);
            }
        };

        let mut scan = protocol::scan_tool_calls(&first.response);

        // Orchestrator-side schema validation against the advertised
        // descriptors; failures join the parse failures and are skipped.
        let mut valid_calls = Vec::new();
        for call in scan.calls.drain(..) {
            match validate_against_descriptors(&call.tool_name, &call.arguments, &tools_list) {
                Ok(()) => valid_calls.push(call),
                Err(reason) => scan.failures.push(ParseFailure {
                    line: call.line,
                    reason,
                }),
            }
        }

        if valid_calls.is_empty() {
            // Plain conversation: the reply is returned verbatim.
            let debug = json!({
                "routing": RoutingType::LlmOnly.as_str(),
                "user_message": message,
                "llm_response": first.response,
                "parse_failures": failures_json(&scan.failures),
                "model": self.llm.model(),
            });
            let interaction = Interaction {
                interaction_id: interaction_id.to_string(),
                session_id: session_id.to_string(),
                user_message: message.to_string(),
                final_response: first.response.clone(),
                routing_type: RoutingType::LlmOnly,
                tools_used: Vec::new(),
                tool_results: None,
                llm_payload: Some(json!({ "prompt": first.prompt })),
                llm_response: Some(first.response.clone()),
                debug_info: Some(debug.clone()),
                feedback: Feedback::None,
                created_at: Utc::now(),
            };
            return (
                ChatOutcome {
                    response: first.response,
                    tools_used: Vec::new(),
                    debug,
                    interaction_id: interaction_id.to_string(),
                    session_id: session_id.to_string(),
                    timestamp: interaction.created_at,
                },
                interaction,
            );
        }

        // Dispatch in textual order; results keep that order for synthesis.
        let mut tools_used = Vec::new();
        let mut results = Vec::new();
        for call in &valid_calls {
            let result = self
                .tools
                .call_tool(&call.tool_name, call.arguments.clone(), session_id)
                .await;
            tools_used.push(call.tool_name.clone());
            results.push((call.tool_name.clone(), result));
        }

        let transcript = transcript_for_synthesis(&results);
        let synthesis = self
            .llm
            .generate(synthesis_prompt(message, &transcript))
            .await;

        let (final_response, final_prompt) = match synthesis {
            Ok(exchange) => (exchange.response, exchange.prompt),
            Err(err) => {
                tracing::error!(error = %err, "LLM synthesis failed");
                (
                    "I ran the requested tools but could not compose a summary. \
                     Please try again."
                        .to_string(),
                    String::new(),
                )
            }
        };

        let tool_results = Value::Object(
            results
                .iter()
                .map(|(name, result)| {
                    (name.clone(), serde_json::to_value(result).unwrap_or(Value::Null))
                })
                .collect(),
        );

        let debug = json!({
            "routing": RoutingType::LlmWithTools.as_str(),
            "user_message": message,
            "initial_llm_response": first.response,
            "tool_calls": valid_calls.iter().map(|c| c.line.clone()).collect::<Vec<_>>(),
            "parse_failures": failures_json(&scan.failures),
            "tools_used": tools_used,
            "tool_results": tool_results,
            "final_llm_response": final_response,
            "model": self.llm.model(),
        });

        let interaction = Interaction {
            interaction_id: interaction_id.to_string(),
            session_id: session_id.to_string(),
            user_message: message.to_string(),
            final_response: final_response.clone(),
            routing_type: RoutingType::LlmWithTools,
            tools_used: tools_used.clone(),
            tool_results: Some(tool_results),
            llm_payload: Some(json!({
                "initial_prompt": first.prompt,
                "final_prompt": final_prompt,
            })),
            llm_response: Some(format!(
                "Initial: {}\nFinal: {}",
                first.response, final_response
            )),
            debug_info: Some(debug.clone()),
            feedback: Feedback::None,
            created_at: Utc::now(),
        };

        (
            ChatOutcome {
                response: final_response,
                tools_used,
                debug,
                interaction_id: interaction_id.to_string(),
                session_id: session_id.to_string(),
                timestamp: interaction.created_at,
            },
            interaction,
        )
    }

    fn llm_unavailable(
        &self,
        message: &str,
        session_id: &str,
        interaction_id: &str,
        error: String,
    ) -> (ChatOutcome, Interaction) {
        let response =
            "The language model is not available right now. Please try again in a moment."
                .to_string();
        let debug = json!({
            "routing": RoutingType::LlmOnly.as_str(),
            "user_message": message,
            "error": error,
            "model": self.llm.model(),
        });
        let interaction = Interaction {
            interaction_id: interaction_id.to_string(),
            session_id: session_id.to_string(),
            user_message: message.to_string(),
            final_response: response.clone(),
            routing_type: RoutingType::LlmOnly,
            tools_used: Vec::new(),
            tool_results: None,
            llm_payload: None,
            llm_response: None,
            debug_info: Some(debug.clone()),
            feedback: Feedback::None,
            created_at: Utc::now(),
        };
        (
            ChatOutcome {
                response,
                tools_used: Vec::new(),
                debug,
                interaction_id: interaction_id.to_string(),
                session_id: session_id.to_string(),
                timestamp: interaction.created_at,
            },
            interaction,
        )
    }
}

/// Check a parsed call against the advertised descriptors: the tool must
/// exist and every declared-required key must be present with a primitive
/// type matching the schema.
fn validate_against_descriptors(
    tool_name: &str,
    arguments: &Map<String, Value>,
    descriptors: &[ToolDescriptor],
) -> Result<(), String> {
    let Some(descriptor) = descriptors.iter().find(|d| d.name == tool_name) else {
        return Err(format!("unknown tool '{tool_name}'"));
    };

    let required = descriptor
        .parameters
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for key in required.iter().filter_map(Value::as_str) {
        if !arguments.contains_key(key) {
            return Err(format!("missing required argument '{key}'"));
        }
    }

    let properties = descriptor
        .parameters
        .get("properties")
        .and_then(Value::as_object);
    if let Some(properties) = properties {
        for (key, value) in arguments {
            let Some(declared) = properties.get(key).and_then(|p| p.get("type")) else {
                continue;
            };
            let ok = match declared.as_str() {
                Some("string") => value.is_string(),
                Some("integer") => value.is_i64() || value.is_u64(),
                Some("number") => value.is_number(),
                Some("boolean") => value.is_boolean(),
                _ => true,
            };
            if !ok {
                return Err(format!("argument '{key}' has the wrong type"));
            }
        }
    }

    Ok(())
}

fn failures_json(failures: &[ParseFailure]) -> Value {
    Value::Array(
        failures
            .iter()
            .map(|f| json!({ "line": f.line, "reason": f.reason }))
            .collect(),
    )
}

/// The ordered transcript handed to the synthesis pass. Errors keep their
/// kind and message so the model can explain them.
fn transcript_for_synthesis(results: &[(String, ToolResult)]) -> String {
    let mut out = String::new();
    for (name, result) in results {
        let rendered = serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!("[{name}]\n{rendered}\n\n"));
    }
    out
}

/// Shortcut replies are rendered directly; a failed tool shows its message.
fn render_shortcut_reply(shortcut: &Shortcut, result: &ToolResult) -> String {
    let data = match result {
        ToolResult::Success { data } => data,
        ToolResult::Error { message, .. } => {
            return format!("Sorry, that didn't work: {message}");
        }
    };

    match shortcut.tool_name {
        "get_network_time" => {
            let time = data
                .get("readable_time_local")
                .or_else(|| data.get("readable_time_utc"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let source = data.get("source").and_then(Value::as_str).unwrap_or("unknown");
            format!("The current time according to {source} is {time}.")
        }
        "ping_host" => {
            let host = data.get("host").and_then(Value::as_str).unwrap_or("host");
            let reachable = data
                .get("reachable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if reachable {
                let latency = data
                    .get("avg_latency_ms")
                    .and_then(Value::as_f64)
                    .map(|ms| format!(" with {ms:.1} ms average latency"))
                    .unwrap_or_default();
                let loss = data
                    .get("packet_loss_pct")
                    .and_then(Value::as_f64)
                    .filter(|loss| *loss > 0.0)
                    .map(|loss| format!(" ({loss:.0}% packet loss)"))
                    .unwrap_or_default();
                format!("Ping test to {host}: reachable{latency}{loss}.")
            } else {
                format!("Ping test to {host}: host unreachable.")
            }
        }
        "ha_control_light" | "ha_control_switch" => render_control_reply(data),
        _ => serde_json::to_string(data).unwrap_or_else(|_| "Done.".to_string()),
    }
}

fn render_control_reply(data: &Value) -> String {
    let devices = data
        .get("devices")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let count = data.get("count").and_then(Value::as_u64).unwrap_or(0);

    if count == 1 {
        if let Some(device) = devices.first() {
            let name = device
                .get("friendly_name")
                .or_else(|| device.get("entity_id"))
                .and_then(Value::as_str)
                .unwrap_or("device");
            let state = device
                .get("new_state")
                .and_then(Value::as_str)
                .unwrap_or("updated");
            return format!("✓ {name} is now {state}");
        }
    }

    let mut lines = vec![format!("✓ Controlled {count} device(s):")];
    for device in &devices {
        let name = device
            .get("friendly_name")
            .or_else(|| device.get("entity_id"))
            .and_then(Value::as_str)
            .unwrap_or("device");
        let state = device
            .get("new_state")
            .and_then(Value::as_str)
            .unwrap_or("updated");
        lines.push(format!("  • {name}: {state}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::error::ErrorKind;

    fn descriptors() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "ping_host".to_string(),
                description: "Ping a host.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "hostname": { "type": "string" } },
                    "required": ["hostname"]
                }),
            },
            ToolDescriptor {
                name: "ha_control_light".to_string(),
                description: "Control lights.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "action": { "type": "string" },
                        "brightness": { "type": "integer" }
                    },
                    "required": ["action"]
                }),
            },
        ]
    }

    #[test]
    fn validation_accepts_well_formed_calls() {
        let mut args = Map::new();
        args.insert("hostname".to_string(), json!("example.com"));
        assert!(validate_against_descriptors("ping_host", &args, &descriptors()).is_ok());
    }

    #[test]
    fn validation_rejects_unknown_tools_and_missing_required() {
        let args = Map::new();
        let err = validate_against_descriptors("frobnicate", &args, &descriptors()).unwrap_err();
        assert!(err.contains("unknown tool"));

        let err = validate_against_descriptors("ping_host", &args, &descriptors()).unwrap_err();
        assert!(err.contains("hostname"));
    }

    #[test]
    fn validation_rejects_wrong_types() {
        let mut args = Map::new();
        args.insert("action".to_string(), json!("turn_on"));
        args.insert("brightness".to_string(), json!("very bright"));
        let err =
            validate_against_descriptors("ha_control_light", &args, &descriptors()).unwrap_err();
        assert!(err.contains("brightness"));
    }

    #[test]
    fn shortcut_time_reply_mentions_source_and_time() {
        let shortcut = Shortcut {
            pattern: "time_query",
            tool_name: "get_network_time",
            arguments: Map::new(),
            keywords: vec!["what time".to_string()],
            extracted: Map::new(),
        };
        let result = ToolResult::success(json!({
            "readable_time_local": "2025-03-01 09:15:00 AM PST",
            "source": "ntp:pool.ntp.org",
        }));
        let reply = render_shortcut_reply(&shortcut, &result);
        assert!(reply.contains("ntp:pool.ntp.org"));
        assert!(reply.contains("09:15:00"));
    }

    #[test]
    fn shortcut_failure_renders_the_message_directly() {
        let shortcut = Shortcut {
            pattern: "light_control",
            tool_name: "ha_control_light",
            arguments: Map::new(),
            keywords: Vec::new(),
            extracted: Map::new(),
        };
        let result = ToolResult::error(
            ErrorKind::EffectorUnavailable,
            "Home Assistant is not configured. Set HA_URL and HA_TOKEN.",
        );
        let reply = render_shortcut_reply(&shortcut, &result);
        assert!(reply.contains("Home Assistant is not configured"));
        assert!(!reply.contains("effector_unavailable"));
    }

    #[test]
    fn single_device_control_reads_naturally() {
        let reply = render_control_reply(&json!({
            "action": "turn_off",
            "domain_actuated": "switch",
            "count": 1,
            "devices": [
                { "entity_id": "switch.coffee_maker", "friendly_name": "Coffee Maker", "new_state": "off" }
            ]
        }));
        assert_eq!(reply, "✓ Coffee Maker is now off");
    }

    #[test]
    fn multi_device_control_lists_each_device() {
        let reply = render_control_reply(&json!({
            "action": "turn_on",
            "domain_actuated": "light",
            "count": 3,
            "devices": [
                { "friendly_name": "Kitchen Ceiling", "new_state": "on" },
                { "friendly_name": "Kitchen Island", "new_state": "on" },
                { "friendly_name": "Kitchen Above Cabinet Light", "new_state": "on" }
            ]
        }));
        assert!(reply.starts_with("✓ Controlled 3 device(s):"));
        assert!(reply.contains("• Kitchen Island: on"));
    }

    #[test]
    fn ping_reply_includes_latency_when_known() {
        let shortcut = Shortcut {
            pattern: "ping_query",
            tool_name: "ping_host",
            arguments: Map::new(),
            keywords: Vec::new(),
            extracted: Map::new(),
        };
        let result = ToolResult::success(json!({
            "host": "example.com",
            "reachable": true,
            "avg_latency_ms": 12.0125,
            "packet_loss_pct": 0.0,
        }));
        let reply = render_shortcut_reply(&shortcut, &result);
        assert!(reply.contains("example.com"));
        assert!(reply.contains("12.0 ms"));
    }

    #[test]
    fn synthesis_transcript_keeps_order_and_errors() {
        let results = vec![
            (
                "get_network_time".to_string(),
                ToolResult::success(json!({"source": "system"})),
            ),
            (
                "ping_host".to_string(),
                ToolResult::error(ErrorKind::EffectorTimeout, "Tool 'ping_host' timed out after 10s"),
            ),
        ];
        let transcript = transcript_for_synthesis(&results);
        let time_pos = transcript.find("[get_network_time]").unwrap();
        let ping_pos = transcript.find("[ping_host]").unwrap();
        assert!(time_pos < ping_pos);
        assert!(transcript.contains("effector_timeout"));
        assert!(transcript.contains("timed out"));
    }
}
