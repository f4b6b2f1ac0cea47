//! Presence store built on the shared state store.
//!
//! Presence is soft state: explicit online/offline writes give accurate
//! low-latency transitions in the common case, and TTL expiry is the
//! backstop against crashed instances and missed disconnects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use chatline_core::config::presence::PresenceConfig;
use chatline_core::error::AppError;
use chatline_core::result::AppResult;
use chatline_core::traits::StateStore;
use chatline_core::types::{SessionId, UserId};

use chatline_store::keys;

use super::status::{PresenceRecord, PresenceStatus};

/// Owns presence records and per-user socket sets in the shared store.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    /// Shared state store.
    store: Arc<dyn StateStore>,
    /// Presence record TTL.
    ttl: Duration,
}

impl PresenceStore {
    /// Create a new presence store.
    pub fn new(store: Arc<dyn StateStore>, config: &PresenceConfig) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_seconds),
        }
    }

    /// Record a session coming online: adds it to the user's socket set
    /// and writes an `online` presence record under the TTL.
    ///
    /// An error means the shared store is unavailable; the caller accepts
    /// the connection anyway since presence is best-effort.
    pub async fn set_online(&self, user_id: UserId, session_id: SessionId) -> AppResult<()> {
        self.store
            .sadd(&keys::socket_set(user_id), &session_id.to_string())
            .await?;
        let record = PresenceRecord {
            user_id,
            status: PresenceStatus::Online,
            updated_at: Utc::now(),
            origin_session_id: Some(session_id),
        };
        self.write_record(&record).await
    }

    /// Remove a session from the user's socket set. Only when the set
    /// becomes empty is an `offline` record written.
    ///
    /// Returns whether this call transitioned the user to offline (false
    /// when other sessions remain or the session was already absent).
    pub async fn set_offline(&self, user_id: UserId, session_id: SessionId) -> AppResult<bool> {
        let removed = self
            .store
            .srem(&keys::socket_set(user_id), &session_id.to_string())
            .await?;
        if !removed {
            return Ok(false);
        }
        if self.store.scard(&keys::socket_set(user_id)).await? > 0 {
            return Ok(false);
        }

        // One final write so contacts observe the transition promptly
        // instead of waiting for TTL expiry.
        let record = PresenceRecord {
            user_id,
            status: PresenceStatus::Offline,
            updated_at: Utc::now(),
            origin_session_id: Some(session_id),
        };
        self.write_record(&record).await?;
        Ok(true)
    }

    /// Overwrite the user's status, preserving the current TTL window.
    ///
    /// Offline is a derived state and is rejected here; it is only
    /// reachable by disconnecting. Returns `Ok(None)` when the user has
    /// no current presence record.
    pub async fn update_status(
        &self,
        user_id: UserId,
        status: PresenceStatus,
    ) -> AppResult<Option<PresenceRecord>> {
        if !status.is_settable() {
            return Err(AppError::validation(
                "Status 'offline' cannot be set directly",
            ));
        }

        let current = match self.read_record(user_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let record = PresenceRecord {
            user_id,
            status,
            updated_at: Utc::now(),
            origin_session_id: current.origin_session_id,
        };
        let json = serde_json::to_string(&record)?;
        let written = self
            .store
            .set_keep_ttl(&keys::presence(user_id), &json)
            .await?;
        if !written {
            // Record expired between the read and the write.
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Read a user's presence record. Never errors: a store failure reads
    /// as offline.
    pub async fn get(&self, user_id: UserId) -> Option<PresenceRecord> {
        match self.read_record(user_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Presence read failed");
                None
            }
        }
    }

    /// Read presence records for many users at once. Users without a
    /// record are omitted; a store failure yields an empty map.
    pub async fn get_bulk(&self, user_ids: &[UserId]) -> HashMap<UserId, PresenceRecord> {
        if user_ids.is_empty() {
            return HashMap::new();
        }
        let record_keys: Vec<String> = user_ids.iter().map(|id| keys::presence(*id)).collect();
        let values = match self.store.mget(&record_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "Bulk presence read failed");
                return HashMap::new();
            }
        };

        user_ids
            .iter()
            .zip(values)
            .filter_map(|(user_id, value)| {
                let json = value?;
                match serde_json::from_str::<PresenceRecord>(&json) {
                    Ok(record) => Some((*user_id, record)),
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Corrupt presence record");
                        None
                    }
                }
            })
            .collect()
    }

    /// Extend the presence TTL without altering status.
    ///
    /// The session must still be a member of the user's socket set; this
    /// guards against heartbeats from already-evicted sessions. Returns
    /// whether the extension happened.
    pub async fn refresh_heartbeat(&self, user_id: UserId, session_id: SessionId) -> bool {
        let result = async {
            let member = self
                .store
                .sismember(&keys::socket_set(user_id), &session_id.to_string())
                .await?;
            if !member {
                return Ok(false);
            }
            self.store.expire(&keys::presence(user_id), self.ttl).await
        }
        .await;

        match result {
            Ok(extended) => extended,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Heartbeat refresh failed");
                false
            }
        }
    }

    /// Delete socket sets whose presence record has already expired,
    /// meaning every session went stale without a clean disconnect.
    ///
    /// Purely corrective; the happy path never needs it. Returns the
    /// number of orphaned sets removed.
    pub async fn cleanup_stale(&self) -> AppResult<usize> {
        let socket_keys = self.store.scan_keys(&keys::socket_set_pattern()).await?;
        let mut removed = 0;

        for socket_key in socket_keys {
            let Some(user_id) = keys::user_from_socket_set(&socket_key) else {
                continue;
            };
            if self.store.get(&keys::presence(user_id)).await?.is_none() {
                self.store.delete(&socket_key).await?;
                debug!(user_id = %user_id, "Removed orphaned socket set");
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn read_record(&self, user_id: UserId) -> AppResult<Option<PresenceRecord>> {
        let json = match self.store.get(&keys::presence(user_id)).await? {
            Some(json) => json,
            None => return Ok(None),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    async fn write_record(&self, record: &PresenceRecord) -> AppResult<()> {
        let json = serde_json::to_string(record)?;
        self.store
            .set_ex(&keys::presence(record.user_id), &json, self.ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chatline_store::MemoryStateStore;

    fn make_store() -> PresenceStore {
        make_store_with_ttl(60)
    }

    fn make_store_with_ttl(ttl_seconds: u64) -> PresenceStore {
        let config = PresenceConfig {
            ttl_seconds,
            ..PresenceConfig::default()
        };
        PresenceStore::new(Arc::new(MemoryStateStore::new()), &config)
    }

    #[tokio::test]
    async fn test_online_then_offline_roundtrip() {
        let presence = make_store();
        let user = UserId::new();
        let session = SessionId::new();

        assert!(presence.get(user).await.is_none());

        presence.set_online(user, session).await.unwrap();
        let record = presence.get(user).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Online);
        assert_eq!(record.origin_session_id, Some(session));

        assert!(presence.set_offline(user, session).await.unwrap());
        let record = presence.get(user).await.unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_second_session_keeps_user_online() {
        let presence = make_store();
        let user = UserId::new();
        let (s1, s2) = (SessionId::new(), SessionId::new());

        presence.set_online(user, s1).await.unwrap();
        presence.set_online(user, s2).await.unwrap();

        assert!(!presence.set_offline(user, s1).await.unwrap());
        assert_eq!(
            presence.get(user).await.unwrap().status,
            PresenceStatus::Online
        );

        assert!(presence.set_offline(user, s2).await.unwrap());
        assert_eq!(
            presence.get(user).await.unwrap().status,
            PresenceStatus::Offline
        );
    }

    #[tokio::test]
    async fn test_offline_for_absent_session_is_false() {
        let presence = make_store();
        let user = UserId::new();
        presence.set_online(user, SessionId::new()).await.unwrap();
        assert!(!presence.set_offline(user, SessionId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_status_rejects_offline() {
        let presence = make_store();
        let user = UserId::new();
        presence.set_online(user, SessionId::new()).await.unwrap();
        let err = presence
            .update_status(user, PresenceStatus::Offline)
            .await
            .unwrap_err();
        assert_eq!(err.kind, chatline_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_status_without_record_is_none() {
        let presence = make_store();
        let result = presence
            .update_status(UserId::new(), PresenceStatus::Away)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_status_overwrites_status_only() {
        let presence = make_store();
        let user = UserId::new();
        let session = SessionId::new();
        presence.set_online(user, session).await.unwrap();

        let record = presence
            .update_status(user, PresenceStatus::Busy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PresenceStatus::Busy);
        assert_eq!(record.origin_session_id, Some(session));

        let read_back = presence.get(user).await.unwrap();
        assert_eq!(read_back.status, PresenceStatus::Busy);
    }

    #[tokio::test]
    async fn test_heartbeat_does_not_change_status() {
        let presence = make_store();
        let user = UserId::new();
        let session = SessionId::new();
        presence.set_online(user, session).await.unwrap();
        presence
            .update_status(user, PresenceStatus::Away)
            .await
            .unwrap();

        assert!(presence.refresh_heartbeat(user, session).await);
        assert_eq!(
            presence.get(user).await.unwrap().status,
            PresenceStatus::Away
        );
    }

    #[tokio::test]
    async fn test_heartbeat_from_evicted_session_is_rejected() {
        let presence = make_store();
        let user = UserId::new();
        let session = SessionId::new();
        presence.set_online(user, session).await.unwrap();
        assert!(!presence.refresh_heartbeat(user, SessionId::new()).await);
    }

    #[tokio::test]
    async fn test_record_expires_without_heartbeat() {
        let presence = make_store_with_ttl(1);
        let user = UserId::new();
        presence.set_online(user, SessionId::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(presence.get(user).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_removes_orphaned_socket_sets() {
        let store = Arc::new(MemoryStateStore::new());
        let presence = PresenceStore::new(store.clone(), &PresenceConfig::default());
        let user = UserId::new();
        presence.set_online(user, SessionId::new()).await.unwrap();

        // Simulate every session going stale: the record expires but the
        // socket set was never cleaned up.
        store.delete(&keys::presence(user)).await.unwrap();

        assert_eq!(presence.cleanup_stale().await.unwrap(), 1);
        assert_eq!(
            store.scard(&keys::socket_set(user)).await.unwrap(),
            0,
            "socket set should be gone"
        );

        // A second pass finds nothing.
        assert_eq!(presence.cleanup_stale().await.unwrap(), 0);
    }
}
