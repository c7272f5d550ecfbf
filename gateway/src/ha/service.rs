//! The synchronizer service proper: REST read/write paths over a single
//! cached read model. All cache writes funnel through this struct; the
//! WebSocket reader calls back into [`HomeAssistant::apply_event`] and the
//! REST paths cache what they fetch.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::HaConfig;

use super::cache::{CachedState, StateCache};
use super::{EntityState, HaError};

/// How long HA gets to publish the post-command state before the refetch.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

const REST_TIMEOUT: Duration = Duration::from_secs(5);

// Event-stream states for the health flag.
const WS_NEVER_CONNECTED: u8 = 0;
const WS_CONNECTED: u8 = 1;
const WS_DROPPED: u8 = 2;

pub struct HomeAssistant {
    config: HaConfig,
    http: reqwest::Client,
    cache: StateCache,
    ws_state: AtomicU8,
}

impl HomeAssistant {
    pub fn new(config: HaConfig, cache: StateCache) -> Arc<Self> {
        Arc::new(Self {
            config,
            http: reqwest::Client::new(),
            cache,
            ws_state: AtomicU8::new(WS_NEVER_CONNECTED),
        })
    }

    /// Start the supervised WebSocket subscription and return its task
    /// handle so shutdown can stop the reader first. A no-op when HA is not
    /// configured: the tools then answer `effector_unavailable` and there is
    /// nothing to subscribe to.
    pub fn spawn_event_stream(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.is_configured() {
            tracing::warn!("HA_TOKEN not set, Home Assistant integration disabled");
            return None;
        }
        let ha = Arc::clone(self);
        Some(tokio::spawn(async move {
            super::ws::supervise(ha).await;
        }))
    }

    /// Health-endpoint status: `not_configured | configured | connected |
    /// disconnected`. `configured` means a token is present but the event
    /// stream has not authenticated yet; `disconnected` means it was up and
    /// dropped.
    pub fn health(&self) -> &'static str {
        if !self.config.is_configured() {
            return "not_configured";
        }
        match self.ws_state.load(Ordering::Relaxed) {
            WS_CONNECTED => "connected",
            WS_DROPPED => "disconnected",
            _ => "configured",
        }
    }

    pub(super) fn websocket_url(&self) -> String {
        self.config.websocket_url()
    }

    pub(super) fn token(&self) -> &str {
        &self.config.token
    }

    pub(super) fn set_ws_connected(&self, connected: bool) {
        let state = if connected { WS_CONNECTED } else { WS_DROPPED };
        self.ws_state.store(state, Ordering::Relaxed);
    }

    /// Event path: the only writer that bumps cache entries forward without a
    /// paired REST fetch. `event_time` becomes the entry's `fetched_at`.
    pub(super) async fn apply_event(&self, entity: EntityState, event_time: DateTime<Utc>) {
        self.cache.put(&entity, event_time).await;
    }

    /// Read one entity, cache-first. A fresh cache entry answers directly;
    /// otherwise REST-fetch, cache, return.
    pub async fn get_state(&self, entity_id: &str) -> Result<CachedState, HaError> {
        if !self.config.is_configured() {
            return Err(HaError::NotConfigured);
        }
        if let Some(cached) = self.cache.get(entity_id).await {
            return Ok(cached);
        }

        let entity = self.rest_get_entity(entity_id).await?;
        let fetched_at = Utc::now();
        self.cache.put(&entity, fetched_at).await;
        Ok(CachedState { entity, fetched_at })
    }

    /// Bulk read, optionally filtered by domain. Every fetched entity is
    /// cached before the in-memory filter is applied.
    pub async fn list_states(&self, domain: Option<&str>) -> Result<Vec<EntityState>, HaError> {
        if !self.config.is_configured() {
            return Err(HaError::NotConfigured);
        }

        let url = self.config.rest_url("api/states");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .timeout(REST_TIMEOUT)
            .send()
            .await
            .map_err(|err| HaError::Unreachable(err.to_string()))?;
        let states: Vec<EntityState> = Self::decode(response).await?;

        let fetched_at = Utc::now();
        for entity in &states {
            self.cache.put(entity, fetched_at).await;
        }

        Ok(match domain {
            Some(domain) => states
                .into_iter()
                .filter(|entity| entity.domain() == domain)
                .collect(),
            None => states,
        })
    }

    /// Write path: REST service call, then immediate cache invalidation.
    /// Callers that need the post-command state go through [`Self::actuate`].
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        extra: Map<String, Value>,
    ) -> Result<(), HaError> {
        if !self.config.is_configured() {
            return Err(HaError::NotConfigured);
        }

        let mut body = Map::new();
        body.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
        body.extend(extra);

        let url = self.config.rest_url(&format!("api/services/{domain}/{service}"));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .timeout(REST_TIMEOUT)
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|err| HaError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HaError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The entry is now stale; evict before anyone reads it.
        self.cache.invalidate(entity_id).await;
        Ok(())
    }

    /// Command plus coherent read-back: service call, invalidation, settle
    /// delay, refetch. If the refetch fails the cache stays invalidated, so
    /// the next read is guaranteed fresh.
    pub async fn actuate(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        extra: Map<String, Value>,
    ) -> Result<Option<CachedState>, HaError> {
        self.call_service(domain, service, entity_id, extra).await?;

        tokio::time::sleep(SETTLE_DELAY).await;
        self.cache.invalidate(entity_id).await;

        match self.get_state(entity_id).await {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                tracing::warn!(entity_id, error = %err, "post-command refetch failed, cache left invalidated");
                Ok(None)
            }
        }
    }

    async fn rest_get_entity(&self, entity_id: &str) -> Result<EntityState, HaError> {
        let url = self.config.rest_url(&format!("api/states/{entity_id}"));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .timeout(REST_TIMEOUT)
            .send()
            .await
            .map_err(|err| HaError::Unreachable(err.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, HaError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HaError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|err| HaError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> Arc<HomeAssistant> {
        HomeAssistant::new(
            HaConfig {
                url: "http://ha.internal".to_string(),
                token: String::new(),
                cache_ttl_secs: 30,
            },
            StateCache::disabled(30),
        )
    }

    #[test]
    fn health_reflects_configuration_and_connection() {
        let ha = unconfigured();
        assert_eq!(ha.health(), "not_configured");

        let ha = HomeAssistant::new(
            HaConfig {
                url: "http://ha.internal".to_string(),
                token: "token".to_string(),
                cache_ttl_secs: 30,
            },
            StateCache::disabled(30),
        );
        assert_eq!(ha.health(), "configured");
        ha.set_ws_connected(true);
        assert_eq!(ha.health(), "connected");
        ha.set_ws_connected(false);
        assert_eq!(ha.health(), "disconnected");
    }

    #[tokio::test]
    async fn unconfigured_reads_and_writes_fail_fast() {
        let ha = unconfigured();
        assert!(matches!(
            ha.get_state("light.kitchen").await,
            Err(HaError::NotConfigured)
        ));
        assert!(matches!(
            ha.list_states(Some("light")).await,
            Err(HaError::NotConfigured)
        ));
        assert!(matches!(
            ha.call_service("light", "turn_on", "light.kitchen", Map::new())
                .await,
            Err(HaError::NotConfigured)
        ));
    }
}
