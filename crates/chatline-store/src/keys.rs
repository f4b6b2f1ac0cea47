//! State store key builders for all Chatline presence entries.
//!
//! Centralising key construction prevents typos and makes it easy to find
//! every key the application uses.

use std::str::FromStr;

use chatline_core::types::UserId;

/// Prefix applied to all Chatline state store keys.
const PREFIX: &str = "chatline";

/// Key of a user's presence record.
pub fn presence(user_id: UserId) -> String {
    format!("{PREFIX}:presence:{user_id}")
}

/// Key of a user's socket set (live session IDs across all instances).
pub fn socket_set(user_id: UserId) -> String {
    format!("{PREFIX}:sockets:{user_id}")
}

/// Scan pattern matching every socket set key.
pub fn socket_set_pattern() -> String {
    format!("{PREFIX}:sockets:*")
}

/// Extract the user ID from a socket set key.
pub fn user_from_socket_set(key: &str) -> Option<UserId> {
    let suffix = key.strip_prefix(&format!("{PREFIX}:sockets:"))?;
    UserId::from_str(suffix).ok()
}

/// Key of a user's cached contact list.
pub fn contacts(user_id: UserId) -> String {
    format!("{PREFIX}:contacts:{user_id}")
}

/// Pub/sub channel carrying cross-instance presence fan-out envelopes.
pub fn fanout_channel() -> String {
    format!("{PREFIX}:fanout")
}
