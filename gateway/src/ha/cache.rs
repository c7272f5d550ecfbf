//! Redis-backed state cache. The synchronizer is the only writer; readers get
//! an atomic per-key snapshot. When Redis is down the cache degrades to
//! no-op reads and writes, which the health endpoint surfaces — every lookup
//! then falls through to REST.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::config::RedisConfig;

use super::EntityState;

const KEY_PREFIX: &str = "ha:state:";

/// A cached entity snapshot plus the time it was sourced. `fetched_at` is the
/// REST fetch time, or the event time when the entry came off the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedState {
    pub entity: EntityState,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StateCache {
    conn: Option<ConnectionManager>,
    ttl_secs: u64,
}

impl StateCache {
    /// Connect to Redis; on failure return a disabled cache and log why.
    pub async fn connect(config: &RedisConfig, ttl_secs: u64) -> Self {
        let url = config.url();
        let conn = match redis::Client::open(url.as_str()) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    tracing::info!(host = %config.host, port = config.port, "connected to Redis state cache");
                    Some(conn)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Redis unavailable, HA state caching disabled");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "invalid Redis configuration, HA state caching disabled");
                None
            }
        };
        Self { conn, ttl_secs }
    }

    #[cfg(test)]
    pub fn disabled(ttl_secs: u64) -> Self {
        Self { conn: None, ttl_secs }
    }

    /// Live status for the health endpoint.
    pub async fn backend_status(&self) -> &'static str {
        let Some(conn) = &self.conn else {
            return "disconnected";
        };
        let mut conn = conn.clone();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        }
    }

    pub async fn get(&self, entity_id: &str) -> Option<CachedState> {
        let mut conn = self.conn.clone()?;
        let raw: Option<String> = match conn.get(format!("{KEY_PREFIX}{entity_id}")).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(entity_id, error = %err, "cache read failed");
                return None;
            }
        };
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Upsert an entity snapshot. The TTL bounds staleness for entries the
    /// event stream stops refreshing.
    pub async fn put(&self, entity: &EntityState, fetched_at: DateTime<Utc>) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();
        let entry = CachedState {
            entity: entity.clone(),
            fetched_at,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(entity_id = %entity.entity_id, error = %err, "cache encode failed");
                return;
            }
        };
        if let Err(err) = conn
            .set_ex::<_, _, ()>(format!("{KEY_PREFIX}{}", entity.entity_id), raw, self.ttl_secs)
            .await
        {
            tracing::warn!(entity_id = %entity.entity_id, error = %err, "cache write failed");
        }
    }

    /// Evict an entry after a command so the next read refetches. Failures are
    /// logged, never dropped silently.
    pub async fn invalidate(&self, entity_id: &str) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();
        if let Err(err) = conn.del::<_, ()>(format!("{KEY_PREFIX}{entity_id}")).await {
            tracing::warn!(entity_id, error = %err, "cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn disabled_cache_reads_nothing_and_reports_disconnected() {
        let cache = StateCache::disabled(30);
        assert_eq!(cache.backend_status().await, "disconnected");
        assert!(cache.get("light.kitchen").await.is_none());
        // Writes and invalidations are no-ops, not panics.
        let entity = EntityState {
            entity_id: "light.kitchen".to_string(),
            state: "on".to_string(),
            attributes: serde_json::Map::new(),
            last_changed: None,
            last_updated: None,
        };
        cache.put(&entity, Utc::now()).await;
        cache.invalidate("light.kitchen").await;
    }

    #[test]
    fn cached_state_round_trips() {
        let mut attributes = serde_json::Map::new();
        attributes.insert("brightness".to_string(), json!(128));
        let entry = CachedState {
            entity: EntityState {
                entity_id: "light.kitchen".to_string(),
                state: "on".to_string(),
                attributes,
                last_changed: None,
                last_updated: None,
            },
            fetched_at: Utc::now(),
        };
        let raw = serde_json::to_string(&entry).unwrap();
        let parsed: CachedState = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.entity.entity_id, "light.kitchen");
        assert_eq!(parsed.entity.brightness(), Some(128));
    }
}
