//! # chatline-realtime
//!
//! Real-time presence core for Chatline. Provides:
//!
//! - Connection registry mapping users to their live sessions, with
//!   stale-entry sweeping, forced disconnect, and metrics
//! - Presence store over the shared state store: TTL-backed presence
//!   records, per-user socket sets, heartbeat refresh, contact caching
//! - Per-session protocol handler: authentication, status updates with
//!   rate limiting, heartbeats, and contact fan-out on changes
//! - Fan-out bridge for multi-instance deployments via pub/sub
//! - Engine lifecycle object with explicit `start()`/`stop(grace)`

pub mod bridge;
pub mod connection;
pub mod fanout;
pub mod last_seen;
pub mod metrics;
pub mod presence;
pub mod protocol;
pub mod server;

pub use connection::registry::ConnectionRegistry;
pub use fanout::PresenceFanout;
pub use metrics::RegistryMetrics;
pub use presence::store::PresenceStore;
pub use protocol::handler::ActiveSession;
pub use server::{EngineDeps, RealtimeEngine};
