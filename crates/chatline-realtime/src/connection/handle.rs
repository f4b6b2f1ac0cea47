//! Individual session handle.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use chatline_core::types::{SessionId, UserId};

use crate::protocol::events::SessionEvent;

/// Kind of transport carrying a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Bidirectional socket transport.
    WebSocket,
    /// Server-sent events with a request side-channel.
    Sse,
    /// Long polling.
    Polling,
}

impl TransportKind {
    /// Metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Sse => "sse",
            Self::Polling => "polling",
        }
    }
}

/// A handle to one live transport session.
///
/// Holds the sender half of the session's outbound event channel plus
/// metadata about the connected user. The transport owns the receiver
/// and performs the actual network delivery.
#[derive(Debug)]
pub struct SessionHandle {
    /// Unique session ID.
    pub session_id: SessionId,
    /// User who owns this session.
    pub user_id: UserId,
    /// Transport carrying the session.
    pub transport: TransportKind,
    /// When the session was accepted.
    pub connected_at: DateTime<Utc>,
    /// Sender for outbound events.
    outbound: mpsc::Sender<SessionEvent>,
    /// Last time the session showed any inbound traffic.
    last_seen: RwLock<DateTime<Utc>>,
    /// Whether the session is still alive.
    alive: AtomicBool,
}

impl SessionHandle {
    /// Create a new session handle.
    pub fn new(
        user_id: UserId,
        transport: TransportKind,
        outbound: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            user_id,
            transport,
            connected_at: now,
            outbound,
            last_seen: RwLock::new(now),
            alive: AtomicBool::new(true),
        }
    }

    /// Push an event to this session. Best effort: a full buffer drops
    /// the event (slow consumer), a closed channel marks the session dead.
    pub fn send(&self, event: SessionEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.session_id,
                    "Session send buffer full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check whether the session is alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the session dead.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Whether the transport has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Record inbound traffic.
    pub fn touch(&self) {
        *self.last_seen.write().expect("last_seen lock poisoned") = Utc::now();
    }

    /// Last time the session showed inbound traffic.
    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.read().expect("last_seen lock poisoned")
    }

    /// Age of the session.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }
}
