//! Presence status definitions and the stored presence record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatline_core::types::{SessionId, UserId};

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Connected and available.
    Online,
    /// Connected but marked away.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// Not connected. Derived from disconnects and TTL expiry, never set
    /// directly by a client.
    Offline,
}

impl PresenceStatus {
    /// Parse a client-supplied status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "away" => Some(Self::Away),
            "busy" => Some(Self::Busy),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    /// String representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }

    /// Whether a client may request this status directly.
    pub fn is_settable(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence record stored per user under a TTL.
///
/// Absence of the record means the user is offline; a record that is not
/// refreshed within the TTL window expires and reads the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// The user this record belongs to.
    pub user_id: UserId,
    /// Current status.
    pub status: PresenceStatus,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
    /// Session that originated the last change, when known.
    pub origin_session_id: Option<SessionId>,
}
