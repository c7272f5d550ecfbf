//! The interaction model and its ephemeral (Redis) store. One `Interaction`
//! is written per user turn; feedback later promotes it to the durable store
//! or removes it.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::RedisConfig;

/// Ephemeral lifetime of an interaction: 24 hours unless promoted.
const INTERACTION_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingType {
    DirectShortcut,
    LlmWithTools,
    LlmOnly,
}

impl RoutingType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingType::DirectShortcut => "direct_shortcut",
            RoutingType::LlmWithTools => "llm_with_tools",
            RoutingType::LlmOnly => "llm_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    #[default]
    None,
    ThumbsUp,
    ThumbsDown,
}

impl Feedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Feedback::None => "none",
            Feedback::ThumbsUp => "thumbs_up",
            Feedback::ThumbsDown => "thumbs_down",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_id: String,
    pub session_id: String,
    pub user_message: String,
    pub final_response: String,
    pub routing_type: RoutingType,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub tool_results: Option<Value>,
    #[serde(default)]
    pub llm_payload: Option<Value>,
    #[serde(default)]
    pub llm_response: Option<String>,
    #[serde(default)]
    pub debug_info: Option<Value>,
    #[serde(default)]
    pub feedback: Feedback,
    pub created_at: DateTime<Utc>,
}

/// Random 128-bit identifier rendered compactly. Uniqueness per call is all
/// that is required of it.
pub fn new_interaction_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn interaction_key(session_id: &str, interaction_id: &str) -> String {
    format!("interaction:{session_id}:{interaction_id}")
}

fn session_index_key(session_id: &str) -> String {
    format!("interactions:{session_id}")
}

/// Ephemeral interaction log. The external store serializes writers per key;
/// no cross-key transactions are needed.
#[derive(Clone)]
pub struct InteractionStore {
    conn: Option<ConnectionManager>,
}

impl InteractionStore {
    pub async fn connect(config: &RedisConfig) -> Self {
        let conn = match redis::Client::open(config.url().as_str()) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    tracing::info!(host = %config.host, port = config.port, "connected to Redis interaction store");
                    Some(conn)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Redis unavailable, interaction logging disabled");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "invalid Redis configuration, interaction logging disabled");
                None
            }
        };
        Self { conn }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Write a fresh interaction with the 24h expiry plus a per-session index
    /// entry. Failures are logged; a lost log line never fails the chat turn.
    pub async fn record(&self, interaction: &Interaction) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();

        let raw = match serde_json::to_string(interaction) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode interaction");
                return;
            }
        };

        let key = interaction_key(&interaction.session_id, &interaction.interaction_id);
        if let Err(err) = conn
            .set_ex::<_, _, ()>(&key, raw, INTERACTION_TTL_SECS)
            .await
        {
            tracing::warn!(error = %err, "failed to log interaction");
            return;
        }

        let index = session_index_key(&interaction.session_id);
        if let Err(err) = conn
            .lpush::<_, _, ()>(&index, &interaction.interaction_id)
            .await
        {
            tracing::warn!(error = %err, "failed to index interaction");
        }
        let _ = conn
            .expire::<_, ()>(&index, INTERACTION_TTL_SECS as i64)
            .await;
    }

    pub async fn fetch(&self, session_id: &str, interaction_id: &str) -> Option<Interaction> {
        let mut conn = self.conn.clone()?;
        let raw: Option<String> = conn
            .get(interaction_key(session_id, interaction_id))
            .await
            .ok()?;
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Rewrite an interaction and drop its expiry — the thumbs-up promotion.
    pub async fn persist(&self, interaction: &Interaction) -> Result<(), String> {
        let Some(conn) = &self.conn else {
            return Err("interaction store unavailable".to_string());
        };
        let mut conn = conn.clone();

        let raw = serde_json::to_string(interaction).map_err(|err| err.to_string())?;
        let key = interaction_key(&interaction.session_id, &interaction.interaction_id);
        conn.set::<_, _, ()>(&key, raw)
            .await
            .map_err(|err| err.to_string())?;
        conn.persist::<_, ()>(&key)
            .await
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    /// Remove an interaction — the thumbs-down path. After this returns the
    /// entry is gone from the ephemeral store.
    pub async fn delete(&self, session_id: &str, interaction_id: &str) -> Result<(), String> {
        let Some(conn) = &self.conn else {
            return Err("interaction store unavailable".to_string());
        };
        let mut conn = conn.clone();
        conn.del::<_, ()>(interaction_key(session_id, interaction_id))
            .await
            .map_err(|err| err.to_string())
    }
}
