//! Connection metrics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::connection::handle::TransportKind;

/// Running counters for the connection registry, exposed read-only.
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    /// Connections accepted since startup.
    connections_total: AtomicU64,
    /// Currently tracked connections.
    connections_active: AtomicU64,
    /// Connections accepted since startup, by transport kind.
    by_transport: DashMap<&'static str, u64>,
}

/// Point-in-time metrics view.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Connections accepted since startup.
    pub connections_total: u64,
    /// Currently tracked connections.
    pub connections_active: u64,
    /// Connections accepted since startup, by transport kind.
    pub by_transport: HashMap<String, u64>,
}

impl RegistryMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted connection.
    pub fn record_connect(&self, transport: TransportKind) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        *self.by_transport.entry(transport.as_str()).or_insert(0) += 1;
    }

    /// Record a removed connection.
    pub fn record_disconnect(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Read-only snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            by_transport: self
                .by_transport
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}
