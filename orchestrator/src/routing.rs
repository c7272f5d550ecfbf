//! The routing policy: a pure function from a user message to a decision.
//! No I/O happens here — execution lives in the chat service, which keeps the
//! regex set testable and tunable (it is a parameter of the system, not a
//! contract).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

static TIME_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(what time|current time|time is it|what is the date|what's the date|today's date|date today|ntp)\b")
        .expect("time intent pattern")
});

static PING_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ping|connectivity check|connectivity test|check connectivity)\b")
        .expect("ping intent pattern")
});

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+)\b").expect("hostname pattern")
});

static CONTROL_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(turn on|turn off|switch on|switch off|toggle)\b").expect("action pattern")
});

static LIGHT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(lights|light|lamps|lamp|brightness)\b").expect("light keyword pattern")
});

static SWITCH_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(switches|switch|outlets|outlet|plugs|plug|fan|coffee)\b")
        .expect("switch keyword pattern")
});

const LIGHT_FILLER: &[&str] = &["the", "please", "my", "all", "lights", "light", "lamps", "lamp"];
const SWITCH_FILLER: &[&str] = &["the", "please", "my", "all", "switches", "switch"];

/// A shortcut decision: which tool to call, with what arguments, plus the
/// evidence that led there (recorded in `debug_info`).
#[derive(Debug, Clone, PartialEq)]
pub struct Shortcut {
    pub pattern: &'static str,
    pub tool_name: &'static str,
    pub arguments: Map<String, Value>,
    pub keywords: Vec<String>,
    pub extracted: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    Shortcut(Shortcut),
    Llm,
}

/// Decide how to route a message. Matches are mutually exclusive; the first
/// matching intent wins, otherwise the LLM path is taken.
pub fn route(message: &str) -> RoutingDecision {
    let lowered = message.to_lowercase();

    if let Some(shortcut) = time_shortcut(&lowered) {
        return RoutingDecision::Shortcut(shortcut);
    }
    if let Some(shortcut) = ping_shortcut(&lowered) {
        return RoutingDecision::Shortcut(shortcut);
    }
    if let Some(shortcut) = light_shortcut(&lowered) {
        return RoutingDecision::Shortcut(shortcut);
    }
    if let Some(shortcut) = switch_shortcut(&lowered) {
        return RoutingDecision::Shortcut(shortcut);
    }
    RoutingDecision::Llm
}

fn time_shortcut(lowered: &str) -> Option<Shortcut> {
    let keywords = captures(&TIME_INTENT, lowered);
    if keywords.is_empty() {
        return None;
    }
    let mut extracted = Map::new();
    extracted.insert("query_type".to_string(), json!("current_time"));
    Some(Shortcut {
        pattern: "time_query",
        tool_name: "get_network_time",
        arguments: Map::new(),
        keywords,
        extracted,
    })
}

fn ping_shortcut(lowered: &str) -> Option<Shortcut> {
    let keywords = captures(&PING_INTENT, lowered);
    if keywords.is_empty() {
        return None;
    }

    let extracted_hostname = HOSTNAME
        .captures(lowered)
        .map(|caps| caps[1].to_string());
    let hostname = extracted_hostname
        .clone()
        .unwrap_or_else(|| "google.com".to_string());

    let mut arguments = Map::new();
    arguments.insert("hostname".to_string(), json!(hostname));

    let mut extracted = Map::new();
    extracted.insert("hostname".to_string(), json!(hostname));
    extracted.insert(
        "extracted_from_message".to_string(),
        json!(extracted_hostname.is_some()),
    );

    Some(Shortcut {
        pattern: "ping_query",
        tool_name: "ping_host",
        arguments,
        keywords,
        extracted,
    })
}

fn light_shortcut(lowered: &str) -> Option<Shortcut> {
    let keywords = captures(&LIGHT_KEYWORD, lowered);
    if keywords.is_empty() {
        return None;
    }
    let (action_phrase, action) = control_action(lowered)?;
    let name_filter = extract_target(lowered, LIGHT_FILLER);

    let mut arguments = Map::new();
    arguments.insert("action".to_string(), json!(action));
    if let Some(filter) = &name_filter {
        arguments.insert("name_filter".to_string(), json!(filter));
    }

    let mut extracted = Map::new();
    extracted.insert("action_phrase".to_string(), json!(action_phrase));
    extracted.insert("action".to_string(), json!(action));
    extracted.insert(
        "target_name".to_string(),
        json!(name_filter.unwrap_or_else(|| "(all matching)".to_string())),
    );

    Some(Shortcut {
        pattern: "light_control",
        tool_name: "ha_control_light",
        arguments,
        keywords,
        extracted,
    })
}

fn switch_shortcut(lowered: &str) -> Option<Shortcut> {
    let keywords = captures(&SWITCH_KEYWORD, lowered);
    if keywords.is_empty() {
        return None;
    }
    let (action_phrase, action) = control_action(lowered)?;
    let name_filter = extract_target(lowered, SWITCH_FILLER);

    let mut arguments = Map::new();
    arguments.insert("action".to_string(), json!(action));
    if let Some(filter) = &name_filter {
        arguments.insert("name_filter".to_string(), json!(filter));
    }

    let mut extracted = Map::new();
    extracted.insert("action_phrase".to_string(), json!(action_phrase));
    extracted.insert("action".to_string(), json!(action));
    extracted.insert(
        "target_name".to_string(),
        json!(name_filter.unwrap_or_else(|| "(all matching)".to_string())),
    );

    Some(Shortcut {
        pattern: "switch_control",
        tool_name: "ha_control_switch",
        arguments,
        keywords,
        extracted,
    })
}

fn control_action(lowered: &str) -> Option<(String, &'static str)> {
    let phrase = CONTROL_ACTION.captures(lowered)?[1].to_string();
    let action = match phrase.as_str() {
        "turn on" | "switch on" => "turn_on",
        "turn off" | "switch off" => "turn_off",
        _ => "toggle",
    };
    Some((phrase, action))
}

/// Strip the action phrase and filler words; whatever remains is the target
/// phrase handed to the fuzzy resolver.
fn extract_target(lowered: &str, filler: &[&str]) -> Option<String> {
    let without_action = CONTROL_ACTION.replace_all(lowered, " ");
    let target: Vec<&str> = without_action
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty() && !filler.contains(word))
        .collect();
    if target.is_empty() {
        None
    } else {
        Some(target.join(" "))
    }
}

fn captures(pattern: &Regex, lowered: &str) -> Vec<String> {
    pattern
        .captures_iter(lowered)
        .map(|caps| caps[1].to_string())
        .collect()
}
