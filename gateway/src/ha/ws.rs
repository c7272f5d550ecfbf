//! WebSocket reader for HA's `state_changed` event stream, run under a
//! supervisor loop that reconnects with a fixed backoff. The socket is owned
//! exclusively by this task; the rest of the synchronizer only observes the
//! connected flag and the cache entries it writes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{EntityState, HomeAssistant};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Run the event subscription forever. Any drop, including auth failure,
/// degrades freshness only: reads fall back to REST until the next attempt.
pub(super) async fn supervise(ha: Arc<HomeAssistant>) {
    loop {
        match run_connection(&ha).await {
            Ok(()) => tracing::warn!("HA event stream closed, reconnecting in 5s"),
            Err(err) => tracing::warn!(error = %err, "HA event stream failed, reconnecting in 5s"),
        }
        ha.set_ws_connected(false);
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

async fn run_connection(ha: &Arc<HomeAssistant>) -> Result<(), String> {
    let url = ha.websocket_url();
    let (mut stream, _) = connect_async(&url)
        .await
        .map_err(|err| format!("connect to {url}: {err}"))?;

    // HA handshake: auth_required -> auth -> auth_ok, then subscribe.
    let first = read_json(&mut stream).await?;
    if first.get("type").and_then(Value::as_str) != Some("auth_required") {
        return Err(format!("unexpected greeting: {first}"));
    }

    let auth = json!({ "type": "auth", "access_token": ha.token() });
    stream
        .send(Message::Text(auth.to_string().into()))
        .await
        .map_err(|err| format!("send auth: {err}"))?;

    let verdict = read_json(&mut stream).await?;
    match verdict.get("type").and_then(Value::as_str) {
        Some("auth_ok") => {}
        Some("auth_invalid") => return Err("authentication rejected".to_string()),
        _ => return Err(format!("unexpected auth reply: {verdict}")),
    }

    let subscribe = json!({
        "id": 1,
        "type": "subscribe_events",
        "event_type": "state_changed"
    });
    stream
        .send(Message::Text(subscribe.to_string().into()))
        .await
        .map_err(|err| format!("subscribe: {err}"))?;

    ha.set_ws_connected(true);
    tracing::info!("HA event stream authenticated and subscribed to state_changed");

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Ok(payload) = serde_json::from_str::<Value>(&text) {
                    if let Some((entity, event_time)) = parse_state_changed(&payload) {
                        ha.apply_event(entity, event_time).await;
                    }
                }
            }
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(format!("read: {err}")),
        }
    }

    Ok(())
}

async fn read_json<S>(stream: &mut S) -> Result<Value, String>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).map_err(|err| format!("decode: {err}"));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err("connection closed during handshake".to_string());
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(format!("read: {err}")),
        }
    }
}

/// Extract the new entity state and event time from a `state_changed` event.
/// Events with a null `new_state` (entity removed) are ignored; the cache
/// entry expires on its own TTL.
fn parse_state_changed(payload: &Value) -> Option<(EntityState, DateTime<Utc>)> {
    if payload.get("type").and_then(Value::as_str) != Some("event") {
        return None;
    }
    let event = payload.get("event")?;
    if event.get("event_type").and_then(Value::as_str) != Some("state_changed") {
        return None;
    }

    let new_state = event.get("data")?.get("new_state")?;
    let entity: EntityState = serde_json::from_value(new_state.clone()).ok()?;

    let event_time = event
        .get("time_fired")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some((entity, event_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_changed_event() {
        let payload = json!({
            "id": 1,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "time_fired": "2025-03-01T08:30:00+00:00",
                "data": {
                    "entity_id": "light.kitchen_island",
                    "new_state": {
                        "entity_id": "light.kitchen_island",
                        "state": "on",
                        "attributes": { "friendly_name": "Kitchen Island", "brightness": 200 }
                    }
                }
            }
        });
        let (entity, event_time) = parse_state_changed(&payload).expect("should parse");
        assert_eq!(entity.entity_id, "light.kitchen_island");
        assert_eq!(entity.state, "on");
        assert_eq!(entity.brightness(), Some(200));
        assert_eq!(event_time.to_rfc3339(), "2025-03-01T08:30:00+00:00");
    }

    #[test]
    fn ignores_other_event_types_and_removed_entities() {
        let other = json!({
            "type": "event",
            "event": { "event_type": "call_service", "data": {} }
        });
        assert!(parse_state_changed(&other).is_none());

        let removed = json!({
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": { "entity_id": "light.gone", "new_state": null }
            }
        });
        assert!(parse_state_changed(&removed).is_none());

        let pong = json!({ "type": "pong", "id": 7 });
        assert!(parse_state_changed(&pong).is_none());
    }
}
