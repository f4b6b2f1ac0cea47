//! Contact list caching.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use chatline_core::config::presence::PresenceConfig;
use chatline_core::result::AppResult;
use chatline_core::traits::{ContactSource, StateStore};
use chatline_core::types::UserId;

use chatline_store::keys;

/// Bounded-TTL cache of contact lists in front of the relational store.
///
/// Eventually consistent with the source of truth; contact-relationship
/// mutations (add/remove/block) must call [`ContactCache::invalidate`].
#[derive(Debug, Clone)]
pub struct ContactCache {
    /// Shared state store holding cached lists.
    store: Arc<dyn StateStore>,
    /// Authoritative contact relation.
    source: Arc<dyn ContactSource>,
    /// Cache entry TTL.
    ttl: Duration,
}

impl ContactCache {
    /// Create a new contact cache.
    pub fn new(
        store: Arc<dyn StateStore>,
        source: Arc<dyn ContactSource>,
        config: &PresenceConfig,
    ) -> Self {
        Self {
            store,
            source,
            ttl: Duration::from_secs(config.contact_cache_ttl_seconds),
        }
    }

    /// The user's contact IDs, from cache when fresh.
    ///
    /// Cache failures fall through to the relational store; relational
    /// failures propagate.
    pub async fn contacts(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        let key = keys::contacts(user_id);

        match self.store.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<UserId>>(&json) {
                Ok(ids) => return Ok(ids),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Corrupt cached contact list");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Contact cache read failed");
            }
        }

        let ids = self.source.contact_ids(user_id).await?;
        match serde_json::to_string(&ids) {
            Ok(json) => {
                if let Err(e) = self.store.set_ex(&key, &json, self.ttl).await {
                    warn!(user_id = %user_id, error = %e, "Contact cache write failed");
                }
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "Contact list serialization failed"),
        }
        Ok(ids)
    }

    /// Drop the cached list so the next read reloads from the relational
    /// store. Called by the contact-management collaborator on mutation.
    pub async fn invalidate(&self, user_id: UserId) -> AppResult<()> {
        self.store.delete(&keys::contacts(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use chatline_store::MemoryStateStore;

    #[derive(Debug)]
    struct StaticContacts {
        ids: Vec<UserId>,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ContactSource for StaticContacts {
        async fn contact_ids(&self, _user_id: UserId) -> AppResult<Vec<UserId>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.ids.clone())
        }
    }

    fn make_cache(ids: Vec<UserId>) -> (ContactCache, Arc<StaticContacts>) {
        let source = Arc::new(StaticContacts {
            ids,
            loads: AtomicUsize::new(0),
        });
        let cache = ContactCache::new(
            Arc::new(MemoryStateStore::new()),
            source.clone(),
            &PresenceConfig::default(),
        );
        (cache, source)
    }

    #[tokio::test]
    async fn test_second_read_is_cached() {
        let contacts = vec![UserId::new(), UserId::new()];
        let (cache, source) = make_cache(contacts.clone());
        let user = UserId::new();

        assert_eq!(cache.contacts(user).await.unwrap(), contacts);
        assert_eq!(cache.contacts(user).await.unwrap(), contacts);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let (cache, source) = make_cache(vec![UserId::new()]);
        let user = UserId::new();

        cache.contacts(user).await.unwrap();
        cache.invalidate(user).await.unwrap();
        cache.contacts(user).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
