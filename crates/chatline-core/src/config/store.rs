//! Shared state store configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the shared state store (Redis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL.
    pub url: String,
    /// Timeout for a single connection attempt, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Initial reconnect backoff, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling, in seconds. Attempts stop once the backoff would
    /// exceed this.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_seconds: u64,
    /// Whether to fall back to the in-memory store when the ceiling is
    /// reached (degraded single-instance mode) instead of failing startup.
    #[serde(default = "default_true")]
    pub fallback_to_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout_seconds: default_connect_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_seconds: default_backoff_cap(),
            fallback_to_memory: true,
        }
    }
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_cap() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
