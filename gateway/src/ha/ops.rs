//! The HA-backed tool operations: device-state queries and light/switch
//! control with fuzzy targeting, the light-to-switch fallback, and coherent
//! post-command read-back.

use serde_json::{json, Map, Value};

use haven_core::error::ErrorKind;
use haven_core::tool::ToolResult;

use crate::registry::ControlAction;

use super::resolve;
use super::{EntityState, HomeAssistant};

/// Bulk query answers are capped; the note tells the caller what was dropped.
const DEVICE_LIMIT: usize = 20;

pub async fn get_device_state(
    ha: &HomeAssistant,
    entity_id: Option<&str>,
    domain: Option<&str>,
    name_filter: Option<&str>,
) -> ToolResult {
    if let Some(entity_id) = entity_id {
        return match ha.get_state(entity_id).await {
            Ok(cached) => ToolResult::success(json!({
                "entity_id": cached.entity.entity_id,
                "state": cached.entity.state,
                "attributes": cached.entity.attributes,
                "last_changed": cached.entity.last_changed,
                "last_updated": cached.entity.last_updated,
                "fetched_at": cached.fetched_at,
            })),
            Err(err) => err.into_tool_result(),
        };
    }

    let states = match ha.list_states(domain).await {
        Ok(states) => states,
        Err(err) => return err.into_tool_result(),
    };

    let states: Vec<EntityState> = match name_filter {
        Some(filter) => {
            let tokens = resolve::filter_tokens(filter);
            states
                .into_iter()
                .filter(|entity| resolve::matches(&tokens, entity))
                .collect()
        }
        None => states,
    };

    let total = states.len();
    let devices: Vec<Value> = states
        .iter()
        .take(DEVICE_LIMIT)
        .map(|entity| {
            json!({
                "entity_id": entity.entity_id,
                "name": entity.friendly_name(),
                "state": entity.state,
                "unit": entity.attributes.get("unit_of_measurement"),
                "device_class": entity.attributes.get("device_class"),
            })
        })
        .collect();

    let mut payload = json!({
        "count": devices.len(),
        "devices": devices,
    });
    if total > DEVICE_LIMIT {
        payload["note"] = json!(format!("Showing {DEVICE_LIMIT} of {total} matching devices"));
    } else if total == 0 {
        payload["note"] = json!("No devices matched the given filters");
    }
    ToolResult::success(payload)
}

pub async fn control_light(
    ha: &HomeAssistant,
    action: ControlAction,
    entity_id: Option<&str>,
    name_filter: Option<&str>,
    brightness: Option<u8>,
) -> ToolResult {
    control(ha, "light", action, entity_id, name_filter, brightness).await
}

pub async fn control_switch(
    ha: &HomeAssistant,
    action: ControlAction,
    entity_id: Option<&str>,
    name_filter: Option<&str>,
) -> ToolResult {
    control(ha, "switch", action, entity_id, name_filter, None).await
}

async fn control(
    ha: &HomeAssistant,
    domain: &str,
    action: ControlAction,
    entity_id: Option<&str>,
    name_filter: Option<&str>,
    brightness: Option<u8>,
) -> ToolResult {
    let (targets, domain_actuated) = match (entity_id, name_filter) {
        (Some(entity_id), _) => (vec![entity_id.to_string()], domain.to_string()),
        (None, Some(filter)) => match resolve_targets(ha, domain, filter).await {
            Ok(resolved) => resolved,
            Err(result) => return result,
        },
        (None, None) => {
            return ToolResult::error(
                ErrorKind::InvalidArguments,
                "Either 'entity_id' or 'name_filter' must be provided",
            );
        }
    };

    // Brightness only applies when turning lights on; HA rejects it elsewhere.
    let mut extra = Map::new();
    if action == ControlAction::TurnOn && domain_actuated == "light" {
        if let Some(brightness) = brightness {
            extra.insert("brightness".to_string(), json!(brightness));
        }
    }

    let mut devices = Vec::new();
    let mut failures = Vec::new();
    let mut first_error = None;
    for target in &targets {
        match ha
            .actuate(&domain_actuated, action.as_str(), target, extra.clone())
            .await
        {
            Ok(Some(cached)) => devices.push(json!({
                "entity_id": cached.entity.entity_id,
                "friendly_name": cached.entity.friendly_name(),
                "new_state": cached.entity.state,
                "brightness": cached.entity.brightness(),
                "fetched_at": cached.fetched_at,
            })),
            Ok(None) => devices.push(json!({
                "entity_id": target,
                "new_state": Value::Null,
                "note": "command accepted, state refetch pending",
            })),
            Err(err) => {
                failures.push(json!({ "entity_id": target, "error": err.to_string() }));
                first_error.get_or_insert(err);
            }
        }
    }

    if devices.is_empty() {
        if let Some(err) = first_error {
            return err.into_tool_result();
        }
    }

    let mut payload = json!({
        "action": action.as_str(),
        "domain_actuated": domain_actuated,
        "count": devices.len(),
        "devices": devices,
    });
    if !failures.is_empty() {
        payload["failures"] = Value::Array(failures);
    }
    ToolResult::success(payload)
}

/// Resolve a name filter to target entity ids. For lights with no match, the
/// switch domain is retried — lamps plugged into smart switches answer to
/// light-shaped phrases.
async fn resolve_targets(
    ha: &HomeAssistant,
    domain: &str,
    filter: &str,
) -> Result<(Vec<String>, String), ToolResult> {
    let candidates = match ha.list_states(Some(domain)).await {
        Ok(candidates) => candidates,
        Err(err) => return Err(err.into_tool_result()),
    };
    let matched = resolve::resolve(filter, &candidates);
    if !matched.is_empty() {
        return Ok((
            matched.iter().map(|e| e.entity_id.clone()).collect(),
            domain.to_string(),
        ));
    }

    if domain == "light" {
        let switches = match ha.list_states(Some("switch")).await {
            Ok(switches) => switches,
            Err(err) => return Err(err.into_tool_result()),
        };
        let matched = resolve::resolve(filter, &switches);
        if !matched.is_empty() {
            return Ok((
                matched.iter().map(|e| e.entity_id.clone()).collect(),
                "switch".to_string(),
            ));
        }
        return Err(ToolResult::error(
            ErrorKind::InvalidArguments,
            format!("No lights or switches found matching '{filter}'"),
        ));
    }

    Err(ToolResult::error(
        ErrorKind::InvalidArguments,
        format!("No {domain} devices found matching '{filter}'"),
    ))
}
