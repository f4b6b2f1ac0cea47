//! State store bring-up and delegation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use chatline_core::config::store::StoreConfig;
use chatline_core::result::AppResult;
use chatline_core::traits::StateStore;

use crate::memory::MemoryStateStore;
use crate::redis::{RedisClient, RedisStateStore};

/// State store manager that wraps the selected store implementation.
///
/// Connects to Redis with capped exponential backoff; once the backoff
/// ceiling is reached it falls back to the in-memory store (degraded
/// single-instance mode) when configured, instead of refusing to start.
#[derive(Debug, Clone)]
pub struct StateStoreManager {
    /// The inner store implementation.
    inner: Arc<dyn StateStore>,
    /// Redis client, present only when connected to a shared store.
    redis: Option<RedisClient>,
}

impl StateStoreManager {
    /// Connect to the configured state store.
    pub async fn connect(config: &StoreConfig) -> AppResult<Self> {
        let mut backoff = Duration::from_millis(config.backoff_base_ms);
        let cap = Duration::from_secs(config.backoff_cap_seconds);

        loop {
            match RedisClient::connect(config).await {
                Ok(client) => {
                    return Ok(Self {
                        inner: Arc::new(RedisStateStore::new(client.clone())),
                        redis: Some(client),
                    });
                }
                Err(e) if backoff <= cap => {
                    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                    warn!(
                        error = %e,
                        retry_in_ms = (backoff + jitter).as_millis() as u64,
                        "State store unavailable, retrying"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    backoff *= 2;
                }
                Err(e) if config.fallback_to_memory => {
                    warn!(
                        error = %e,
                        "State store unreachable after backoff ceiling, \
                         continuing with in-memory store (single-instance mode)"
                    );
                    return Ok(Self::in_memory());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create a manager over the in-memory store.
    pub fn in_memory() -> Self {
        info!("Using in-memory state store");
        Self {
            inner: Arc::new(MemoryStateStore::new()),
            redis: None,
        }
    }

    /// Create a manager from an existing store (for testing).
    pub fn from_store(store: Arc<dyn StateStore>) -> Self {
        Self {
            inner: store,
            redis: None,
        }
    }

    /// Whether the store is shared across instances.
    pub fn is_distributed(&self) -> bool {
        self.redis.is_some()
    }

    /// The Redis client backing the store, when distributed.
    pub fn redis_client(&self) -> Option<&RedisClient> {
        self.redis.as_ref()
    }

    /// The inner store as a trait object.
    pub fn store(&self) -> Arc<dyn StateStore> {
        self.inner.clone()
    }
}

#[async_trait]
impl StateStore for StateStoreManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set_keep_ttl(&self, key: &str, value: &str) -> AppResult<bool> {
        self.inner.set_keep_ttl(key, value).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        self.inner.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        self.inner.srem(key, member).await
    }

    async fn scard(&self, key: &str) -> AppResult<u64> {
        self.inner.scard(key).await
    }

    async fn sismember(&self, key: &str, member: &str) -> AppResult<bool> {
        self.inner.sismember(key, member).await
    }

    async fn mget(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        self.inner.mget(keys).await
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        self.inner.scan_keys(pattern).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_to_memory_after_backoff_ceiling() {
        // Nothing listens on port 1; with a zero ceiling the first failed
        // attempt already exhausts the backoff.
        let config = StoreConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout_seconds: 1,
            backoff_base_ms: 10,
            backoff_cap_seconds: 0,
            fallback_to_memory: true,
        };

        let manager = StateStoreManager::connect(&config).await.unwrap();
        assert!(!manager.is_distributed());
        assert!(manager.redis_client().is_none());
        assert!(manager.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_store_without_fallback_is_an_error() {
        let config = StoreConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout_seconds: 1,
            backoff_base_ms: 10,
            backoff_cap_seconds: 0,
            fallback_to_memory: false,
        };

        assert!(StateStoreManager::connect(&config).await.is_err());
    }
}
