//! # chatline-store
//!
//! Shared state store clients for Chatline. Provides:
//!
//! - A Redis-backed [`StateStore`](chatline_core::traits::StateStore)
//!   with a reconnecting connection manager
//! - An in-memory implementation with real per-entry TTL semantics,
//!   used for single-instance degraded mode and tests
//! - Connection bring-up with bounded timeout and capped exponential
//!   backoff, falling back to the in-memory store when configured
//! - Central key builders for every presence key the application uses

pub mod keys;
pub mod memory;
pub mod provider;
pub mod redis;

pub use crate::redis::{RedisClient, RedisStateStore};
pub use memory::MemoryStateStore;
pub use provider::StateStoreManager;
