//! Shared state store abstraction.
//!
//! The presence subsystem keeps its soft state (presence records, per-user
//! socket sets, cached contact lists) in a key-value store with TTL and
//! set support that is shared by every server instance. This trait covers
//! exactly the operations presence needs; the Redis implementation lives in
//! `chatline-store`, alongside an in-memory implementation used for
//! single-instance degraded mode and tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Key-value store with TTL and set operations, shared across instances.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Read a scalar value.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write a scalar value with a time-to-live.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Overwrite an existing key's value without touching its TTL.
    ///
    /// Returns `false` when the key does not exist (nothing is written).
    async fn set_keep_ttl(&self, key: &str, value: &str) -> AppResult<bool>;

    /// Extend a key's TTL. Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Add a member to a set. Returns `true` when the member was new.
    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool>;

    /// Remove a member from a set. Returns `true` when the member existed.
    /// An emptied set is removed entirely.
    async fn srem(&self, key: &str, member: &str) -> AppResult<bool>;

    /// Number of members in a set (0 for a missing key).
    async fn scard(&self, key: &str) -> AppResult<u64>;

    /// Whether a member is in a set.
    async fn sismember(&self, key: &str, member: &str) -> AppResult<bool>;

    /// Read many scalar values at once, position-aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> AppResult<Vec<Option<String>>>;

    /// List keys matching a `prefix*` pattern.
    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>>;

    /// Whether the store answers a round trip.
    async fn health_check(&self) -> AppResult<bool>;
}
