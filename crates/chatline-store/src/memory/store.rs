//! In-memory state store implementation.
//!
//! Mirrors the Redis semantics the presence layer relies on, including
//! per-entry expiry and removal of emptied sets. Backs single-instance
//! degraded mode when Redis is unreachable, and all unit tests.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use chatline_core::error::AppError;
use chatline_core::result::AppResult;
use chatline_core::traits::StateStore;

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn scalar(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: Value::Scalar(value.to_string()),
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn empty_set() -> Self {
        Self {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::store(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

/// In-memory shared state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStateStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an entry if it has expired; returns whether a live entry remains.
    fn prune(&self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expired(),
            None => return false,
        };
        if expired {
            self.entries.remove(key);
            return false;
        }
        true
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        if !self.prune(key) {
            return Ok(None);
        }
        match self.entries.get(key).as_deref().map(|e| &e.value) {
            Some(Value::Scalar(s)) => Ok(Some(s.clone())),
            Some(Value::Set(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries
            .insert(key.to_string(), Entry::scalar(value, Some(ttl)));
        Ok(())
    }

    async fn set_keep_ttl(&self, key: &str, value: &str) -> AppResult<bool> {
        if !self.prune(key) {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Scalar(s) => {
                    *s = value.to_string();
                    Ok(true)
                }
                Value::Set(_) => Err(wrong_type(key)),
            },
            None => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if !self.prune(key) {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(Entry::empty_set);
        if entry.expired() {
            *entry = Entry::empty_set();
        }
        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            Value::Scalar(_) => Err(wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        if !self.prune(key) {
            return Ok(false);
        }
        let (removed, emptied) = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => {
                    let removed = members.remove(member);
                    (removed, members.is_empty())
                }
                Value::Scalar(_) => return Err(wrong_type(key)),
            },
            None => return Ok(false),
        };
        if emptied {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    async fn scard(&self, key: &str) -> AppResult<u64> {
        if !self.prune(key) {
            return Ok(0);
        }
        match self.entries.get(key).as_deref().map(|e| &e.value) {
            Some(Value::Set(members)) => Ok(members.len() as u64),
            Some(Value::Scalar(_)) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> AppResult<bool> {
        if !self.prune(key) {
            return Ok(false);
        }
        match self.entries.get(key).as_deref().map(|e| &e.value) {
            Some(Value::Set(members)) => Ok(members.contains(member)),
            Some(Value::Scalar(_)) => Err(wrong_type(key)),
            None => Ok(false),
        }
    }

    async fn mget(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let exact = !pattern.ends_with('*');
        let keys = self
            .entries
            .iter()
            .filter(|entry| !entry.value().expired())
            .map(|entry| entry.key().clone())
            .filter(|key| if exact { key == pattern } else { key.starts_with(prefix) })
            .collect();
        Ok(keys)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
