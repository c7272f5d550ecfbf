//! The tool registry: descriptors published to callers plus per-tool
//! validators that turn raw JSON arguments into typed calls before anything
//! reaches an effector. Immutable after startup; reads are lock-free.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Map, Value};

use haven_core::tool::ToolDescriptor;

use crate::effectors::ping;

/// Validation failure; always surfaces as `invalid_arguments` with a message
/// naming the offending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgError {
    pub message: String,
}

impl ArgError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    TurnOn,
    TurnOff,
    Toggle,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::TurnOn => "turn_on",
            ControlAction::TurnOff => "turn_off",
            ControlAction::Toggle => "toggle",
        }
    }

    fn parse(raw: &str) -> Result<Self, ArgError> {
        match raw {
            "turn_on" => Ok(ControlAction::TurnOn),
            "turn_off" => Ok(ControlAction::TurnOff),
            "toggle" => Ok(ControlAction::Toggle),
            other => Err(ArgError::new(format!(
                "'action' must be one of turn_on, turn_off, toggle (got '{other}')"
            ))),
        }
    }
}

/// A fully validated tool call, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedCall {
    NetworkTime,
    PingHost {
        hostname: String,
    },
    GetDeviceState {
        entity_id: Option<String>,
        domain: Option<String>,
        name_filter: Option<String>,
    },
    ControlLight {
        action: ControlAction,
        entity_id: Option<String>,
        name_filter: Option<String>,
        brightness: Option<u8>,
    },
    ControlSwitch {
        action: ControlAction,
        entity_id: Option<String>,
        name_filter: Option<String>,
    },
}

type Validator = fn(&Map<String, Value>) -> Result<TypedCall, ArgError>;

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub timeout: Duration,
    validator: Validator,
}

impl RegisteredTool {
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<TypedCall, ArgError> {
        (self.validator)(arguments)
    }
}

pub struct ToolRegistry {
    tools: BTreeMap<&'static str, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools = BTreeMap::new();
        tools.insert(
            "get_network_time",
            RegisteredTool {
                descriptor: ToolDescriptor {
                    name: "get_network_time".to_string(),
                    description: "Retrieves the current accurate time and date from a network \
                                  source (NTP). Useful for answering 'What time is it?' or \
                                  'What is the date?'."
                        .to_string(),
                    parameters: json!({ "type": "object", "properties": {} }),
                },
                timeout: Duration::from_secs(5),
                validator: validate_network_time,
            },
        );
        tools.insert(
            "ping_host",
            RegisteredTool {
                descriptor: ToolDescriptor {
                    name: "ping_host".to_string(),
                    description: "Sends a network ping request to a specified hostname or IP \
                                  address to check connectivity and latency."
                        .to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "hostname": {
                                "type": "string",
                                "description": "The hostname or IP address to ping (e.g. 'google.com')."
                            }
                        },
                        "required": ["hostname"]
                    }),
                },
                timeout: Duration::from_secs(10),
                validator: validate_ping_host,
            },
        );
        tools.insert(
            "ha_get_device_state",
            RegisteredTool {
                descriptor: ToolDescriptor {
                    name: "ha_get_device_state".to_string(),
                    description: "Get the current state of a Home Assistant device or sensor. \
                                  Use for temperature sensors, humidity, battery levels, or \
                                  checking device status. Supports filtering by domain (sensor, \
                                  binary_sensor, etc.)."
                        .to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "entity_id": {
                                "type": "string",
                                "description": "The entity ID to query (e.g. 'sensor.living_room_temperature'). Optional if using filters."
                            },
                            "domain": {
                                "type": "string",
                                "description": "Filter devices by domain: 'sensor', 'binary_sensor', 'climate', etc. Returns all matching devices."
                            },
                            "name_filter": {
                                "type": "string",
                                "description": "Optional filter to match device names (case-insensitive, partial match)."
                            }
                        },
                        "required": []
                    }),
                },
                timeout: Duration::from_secs(5),
                validator: validate_get_device_state,
            },
        );
        tools.insert(
            "ha_control_light",
            RegisteredTool {
                descriptor: ToolDescriptor {
                    name: "ha_control_light".to_string(),
                    description: "Control Home Assistant lights. Turn on/off, toggle, or set \
                                  brightness (0-255). Use this when the user mentions lights, \
                                  lamps, or illumination."
                        .to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "action": {
                                "type": "string",
                                "enum": ["turn_on", "turn_off", "toggle"],
                                "description": "The action to perform on the light."
                            },
                            "entity_id": {
                                "type": "string",
                                "description": "The light entity ID (e.g. 'light.living_room'). Use name_filter to find lights by name."
                            },
                            "name_filter": {
                                "type": "string",
                                "description": "Find lights by name (e.g. 'living room', 'bedroom')."
                            },
                            "brightness": {
                                "type": "integer",
                                "minimum": 0,
                                "maximum": 255,
                                "description": "Brightness level 0-255 (only when turning on)."
                            }
                        },
                        "required": ["action"]
                    }),
                },
                timeout: Duration::from_secs(5),
                validator: validate_control_light,
            },
        );
        tools.insert(
            "ha_control_switch",
            RegisteredTool {
                descriptor: ToolDescriptor {
                    name: "ha_control_switch".to_string(),
                    description: "Control Home Assistant switches. Turn on/off or toggle \
                                  switches. Use for outlets, relays, or any switchable devices."
                        .to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": {
                            "action": {
                                "type": "string",
                                "enum": ["turn_on", "turn_off", "toggle"],
                                "description": "The action to perform on the switch."
                            },
                            "entity_id": {
                                "type": "string",
                                "description": "The switch entity ID (e.g. 'switch.coffee_maker'). Use name_filter to find by name."
                            },
                            "name_filter": {
                                "type": "string",
                                "description": "Find switches by name (e.g. 'coffee maker', 'fan')."
                            }
                        },
                        "required": ["action"]
                    }),
                },
                timeout: Duration::from_secs(5),
                validator: validate_control_switch,
            },
        );
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Static snapshot of every descriptor, in registration (name) order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_network_time(_args: &Map<String, Value>) -> Result<TypedCall, ArgError> {
    Ok(TypedCall::NetworkTime)
}

fn validate_ping_host(args: &Map<String, Value>) -> Result<TypedCall, ArgError> {
    let hostname = required_string(args, "hostname")?;
    if !ping::hostname_is_valid(&hostname) {
        return Err(ArgError::new(
            "'hostname' must match [A-Za-z0-9._-]{1,253}",
        ));
    }
    Ok(TypedCall::PingHost { hostname })
}

fn validate_get_device_state(args: &Map<String, Value>) -> Result<TypedCall, ArgError> {
    Ok(TypedCall::GetDeviceState {
        entity_id: optional_string(args, "entity_id")?,
        domain: optional_string(args, "domain")?,
        name_filter: optional_string(args, "name_filter")?,
    })
}

fn validate_control_light(args: &Map<String, Value>) -> Result<TypedCall, ArgError> {
    let action = ControlAction::parse(&required_string(args, "action")?)?;
    Ok(TypedCall::ControlLight {
        action,
        entity_id: optional_string(args, "entity_id")?,
        name_filter: optional_string(args, "name_filter")?,
        brightness: optional_brightness(args)?,
    })
}

fn validate_control_switch(args: &Map<String, Value>) -> Result<TypedCall, ArgError> {
    let action = ControlAction::parse(&required_string(args, "action")?)?;
    Ok(TypedCall::ControlSwitch {
        action,
        entity_id: optional_string(args, "entity_id")?,
        name_filter: optional_string(args, "name_filter")?,
    })
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ArgError> {
    match args.get(key) {
        Some(Value::String(v)) if !v.trim().is_empty() => Ok(v.clone()),
        Some(Value::String(_)) => Err(ArgError::new(format!("'{key}' must not be empty"))),
        Some(_) => Err(ArgError::new(format!("'{key}' must be a string"))),
        None => Err(ArgError::new(format!("Missing required field '{key}'"))),
    }
}

fn optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ArgError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(ArgError::new(format!("'{key}' must be a string"))),
    }
}

fn optional_brightness(args: &Map<String, Value>) -> Result<Option<u8>, ArgError> {
    match args.get("brightness") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v @ 0..=255) => Ok(Some(v as u8)),
            Some(_) => Err(ArgError::new("'brightness' must be between 0 and 255")),
            None => Err(ArgError::new("'brightness' must be an integer")),
        },
        Some(_) => Err(ArgError::new("'brightness' must be an integer")),
    }
}
