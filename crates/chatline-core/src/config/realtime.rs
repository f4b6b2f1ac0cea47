//! Real-time engine configuration.

use serde::{Deserialize, Serialize};

/// Connection registry and engine lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Buffer size of each session's outbound event channel.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Maximum concurrent sessions per user; the oldest is evicted beyond
    /// this.
    #[serde(default = "default_max_sessions_per_user")]
    pub max_sessions_per_user: usize,
    /// Interval between stale-session sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Age beyond which an unresponsive session is swept, in seconds.
    #[serde(default = "default_session_max_age")]
    pub session_max_age_seconds: u64,
    /// A session with no traffic for this long counts as unresponsive,
    /// in seconds.
    #[serde(default = "default_unresponsive_after")]
    pub unresponsive_after_seconds: u64,
    /// Interval between presence reconciliation passes, in seconds.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    /// Grace period between a disconnect notice and channel teardown,
    /// in milliseconds.
    #[serde(default = "default_disconnect_grace")]
    pub disconnect_grace_ms: u64,
    /// Grace period between the shutdown notice and closing all sessions,
    /// in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Maximum in-flight contact deliveries per broadcast.
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer(),
            max_sessions_per_user: default_max_sessions_per_user(),
            sweep_interval_seconds: default_sweep_interval(),
            session_max_age_seconds: default_session_max_age(),
            unresponsive_after_seconds: default_unresponsive_after(),
            reconcile_interval_seconds: default_reconcile_interval(),
            disconnect_grace_ms: default_disconnect_grace(),
            shutdown_grace_seconds: default_shutdown_grace(),
            fanout_concurrency: default_fanout_concurrency(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}

fn default_max_sessions_per_user() -> usize {
    8
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_session_max_age() -> u64 {
    3600
}

fn default_unresponsive_after() -> u64 {
    90
}

fn default_reconcile_interval() -> u64 {
    120
}

fn default_disconnect_grace() -> u64 {
    1000
}

fn default_shutdown_grace() -> u64 {
    1
}

fn default_fanout_concurrency() -> usize {
    16
}
