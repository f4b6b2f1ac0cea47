//! Connection registry — maps each user to their live sessions on this
//! instance.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use chatline_core::config::realtime::RealtimeConfig;
use chatline_core::types::{SessionId, UserId};

use crate::metrics::RegistryMetrics;
use crate::protocol::events::SessionEvent;

use super::handle::SessionHandle;

/// Result of registering a session.
#[derive(Debug)]
pub struct RegisterOutcome {
    /// The user had no sessions before this one.
    pub first_for_user: bool,
    /// Session evicted to stay within the per-user cap, if any.
    pub evicted: Option<Arc<SessionHandle>>,
}

/// Result of a stale-session sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Sessions removed.
    pub swept: usize,
    /// Sessions still tracked after the sweep.
    pub retained: usize,
}

/// In-process map from user to live sessions.
///
/// All mutation goes through the sharded map's per-key entry lock, so a
/// connect and a disconnect racing for the same user cannot lose updates.
/// Registry operations are local and never fail; unknown users read as
/// empty.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// User → live session handles.
    sessions: DashMap<UserId, Vec<Arc<SessionHandle>>>,
    /// Connection counters.
    metrics: Arc<RegistryMetrics>,
    /// Per-user session cap.
    max_sessions_per_user: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            metrics: Arc::new(RegistryMetrics::new()),
            max_sessions_per_user: config.max_sessions_per_user,
        }
    }

    /// Add a session to the user's set, creating the set if absent.
    /// Idempotent per session ID.
    ///
    /// `first_for_user` reports the empty → non-empty transition. A user
    /// already at the session cap has their oldest session evicted with a
    /// disconnect notice.
    pub fn register(&self, handle: Arc<SessionHandle>) -> RegisterOutcome {
        let mut evicted = None;
        let first_for_user;
        {
            let mut sessions = self.sessions.entry(handle.user_id).or_default();
            if sessions
                .iter()
                .any(|s| s.session_id == handle.session_id)
            {
                return RegisterOutcome {
                    first_for_user: false,
                    evicted: None,
                };
            }
            first_for_user = sessions.is_empty();
            if sessions.len() >= self.max_sessions_per_user {
                evicted = Some(sessions.remove(0));
            }
            sessions.push(handle.clone());
        }

        self.metrics.record_connect(handle.transport);

        if let Some(old) = &evicted {
            info!(
                user_id = %old.user_id,
                session_id = %old.session_id,
                "Session cap reached, evicting oldest session"
            );
            old.send(SessionEvent::ForceDisconnect {
                reason: "session limit reached".to_string(),
                timestamp: Utc::now(),
            });
            old.mark_dead();
            self.metrics.record_disconnect();
        }

        debug!(
            user_id = %handle.user_id,
            session_id = %handle.session_id,
            transport = handle.transport.as_str(),
            "Session registered"
        );

        RegisterOutcome {
            first_for_user,
            evicted,
        }
    }

    /// Remove a session from the user's set.
    ///
    /// Returns `true` when this removal emptied the set (the user's last
    /// session on this instance); the entry itself is deleted then.
    pub fn unregister(&self, user_id: UserId, session_id: SessionId) -> bool {
        let mut last = false;
        if let Entry::Occupied(mut occ) = self.sessions.entry(user_id) {
            let sessions = occ.get_mut();
            if let Some(pos) = sessions.iter().position(|s| s.session_id == session_id) {
                let handle = sessions.remove(pos);
                handle.mark_dead();
                self.metrics.record_disconnect();
                if sessions.is_empty() {
                    occ.remove();
                    last = true;
                }
                debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    last_for_user = last,
                    "Session unregistered"
                );
            }
        }
        last
    }

    /// Snapshot of the user's current sessions; empty when unknown.
    pub fn sessions_for(&self, user_id: UserId) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Whether the user has at least one session on this instance.
    pub fn is_user_connected(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of users with at least one session.
    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }

    /// Connection counters.
    pub fn metrics(&self) -> Arc<RegistryMetrics> {
        self.metrics.clone()
    }

    /// Deliver a disconnect notice to every session of the user, wait the
    /// grace period, then tear the sessions down.
    ///
    /// Returns the number of sessions terminated; 0 when none exist. The
    /// grace period is skipped when no transport is left to notify.
    pub async fn force_disconnect(
        &self,
        user_id: UserId,
        reason: &str,
        grace: Duration,
    ) -> usize {
        let Some((_, handles)) = self.sessions.remove(&user_id) else {
            return 0;
        };

        let timestamp = Utc::now();
        let mut notified = 0;
        for handle in &handles {
            if handle.send(SessionEvent::ForceDisconnect {
                reason: reason.to_string(),
                timestamp,
            }) {
                notified += 1;
            }
        }

        if notified > 0 && !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }

        for handle in &handles {
            handle.mark_dead();
            self.metrics.record_disconnect();
        }

        info!(
            user_id = %user_id,
            terminated = handles.len(),
            reason,
            "Forced disconnect"
        );
        handles.len()
    }

    /// Remove sessions whose transport is gone, or that exceeded `max_age`
    /// while unresponsive. Guards against entries orphaned by unclean
    /// termination.
    pub fn sweep_stale(&self, max_age: Duration, unresponsive_after: Duration) -> SweepStats {
        let users: Vec<UserId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let now = Utc::now();
        let mut swept = 0;
        let mut retained = 0;

        for user_id in users {
            if let Entry::Occupied(mut occ) = self.sessions.entry(user_id) {
                let sessions = occ.get_mut();
                let before = sessions.len();
                sessions.retain(|session| {
                    let gone = session.is_closed() || !session.is_alive();
                    let expired = session
                        .age()
                        .to_std()
                        .is_ok_and(|age| age > max_age)
                        && (now - session.last_seen())
                            .to_std()
                            .is_ok_and(|idle| idle > unresponsive_after);
                    if gone || expired {
                        session.mark_dead();
                        false
                    } else {
                        true
                    }
                });
                let removed = before - sessions.len();
                swept += removed;
                retained += sessions.len();
                for _ in 0..removed {
                    self.metrics.record_disconnect();
                }
                if sessions.is_empty() {
                    occ.remove();
                }
            }
        }

        SweepStats { swept, retained }
    }

    /// Deliver an event to every tracked session. Returns the number of
    /// sessions the event was queued for.
    pub fn broadcast_all(&self, event: &SessionEvent) -> usize {
        let handles: Vec<Arc<SessionHandle>> = self
            .sessions
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0;
        for handle in &handles {
            if handle.send(event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Tear down every session (shutdown path).
    pub fn close_all(&self) -> usize {
        let users: Vec<UserId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let mut closed = 0;
        for user_id in users {
            if let Some((_, handles)) = self.sessions.remove(&user_id) {
                for handle in &handles {
                    handle.mark_dead();
                    self.metrics.record_disconnect();
                }
                closed += handles.len();
            }
        }
        if closed > 0 {
            info!(count = closed, "All sessions closed");
        }
        closed
    }
}
