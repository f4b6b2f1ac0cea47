//! Presence state configuration.

use serde::{Deserialize, Serialize};

/// Presence record and contact cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// TTL of a presence record in seconds. A record not refreshed within
    /// this window expires and the user reads as offline.
    #[serde(default = "default_presence_ttl")]
    pub ttl_seconds: u64,
    /// TTL of a cached contact list in seconds.
    #[serde(default = "default_contact_cache_ttl")]
    pub contact_cache_ttl_seconds: u64,
    /// Minimum interval between accepted status updates per user, in
    /// seconds (sliding window).
    #[serde(default = "default_status_update_interval")]
    pub status_update_interval_seconds: u64,
    /// Whether contact blocking also filters message visibility in group
    /// conversations. Direct conversations always honor blocking.
    #[serde(default)]
    pub blocking_affects_groups: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_presence_ttl(),
            contact_cache_ttl_seconds: default_contact_cache_ttl(),
            status_update_interval_seconds: default_status_update_interval(),
            blocking_affects_groups: false,
        }
    }
}

fn default_presence_ttl() -> u64 {
    60
}

fn default_contact_cache_ttl() -> u64 {
    300
}

fn default_status_update_interval() -> u64 {
    5
}
