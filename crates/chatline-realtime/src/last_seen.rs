//! Last-seen recording hook.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use chatline_core::types::UserId;

/// Collaborator notified when a user's final session disconnects.
///
/// The chat service's profile layer persists last-seen timestamps; the
/// presence core only reports the transition.
#[async_trait]
pub trait LastSeenRecorder: Send + Sync + std::fmt::Debug {
    /// The user went fully offline at `at`.
    async fn record(&self, user_id: UserId, at: DateTime<Utc>);
}

/// Recorder that only logs, for deployments without a profile layer.
#[derive(Debug, Default)]
pub struct NoopLastSeen;

#[async_trait]
impl LastSeenRecorder for NoopLastSeen {
    async fn record(&self, user_id: UserId, at: DateTime<Utc>) {
        debug!(user_id = %user_id, at = %at, "User went offline");
    }
}
