//! Status update rate limiting.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use chatline_core::types::UserId;

/// Sliding-window limiter: at most one accepted status update per user
/// per window, tracked by the last accepted timestamp.
///
/// The per-key entry lock makes the check-and-update atomic, so two
/// simultaneous requests from the same user cannot both observe a stale
/// timestamp and both be accepted.
#[derive(Debug)]
pub struct StatusRateLimiter {
    /// User → instant of the last accepted update.
    last_accepted: DashMap<UserId, Instant>,
    /// Minimum spacing between accepted updates.
    window: Duration,
}

impl StatusRateLimiter {
    /// Create a limiter with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            last_accepted: DashMap::new(),
            window,
        }
    }

    /// Accept or reject an update for this user, recording the acceptance.
    pub fn try_accept(&self, user_id: UserId) -> bool {
        let now = Instant::now();
        match self.last_accepted.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drop the user's window state (called when their last session ends).
    pub fn forget(&self, user_id: UserId) {
        self.last_accepted.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_admits_one() {
        let limiter = StatusRateLimiter::new(Duration::from_millis(50));
        let user = UserId::new();

        assert!(limiter.try_accept(user));
        assert!(!limiter.try_accept(user));
        assert!(!limiter.try_accept(user));

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(limiter.try_accept(user));
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let limiter = StatusRateLimiter::new(Duration::from_secs(5));
        assert!(limiter.try_accept(UserId::new()));
        assert!(limiter.try_accept(UserId::new()));
    }

    #[tokio::test]
    async fn test_forget_resets_window() {
        let limiter = StatusRateLimiter::new(Duration::from_secs(5));
        let user = UserId::new();
        assert!(limiter.try_accept(user));
        limiter.forget(user);
        assert!(limiter.try_accept(user));
    }
}
