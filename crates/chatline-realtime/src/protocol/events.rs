//! Inbound and outbound session event definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatline_core::types::delivery::DeliveryStatus;
use chatline_core::types::{ConversationId, MessageId, UserId};

use crate::presence::status::PresenceStatus;

/// Events sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// Request to change the caller's presence status.
    #[serde(rename = "presence:update")]
    PresenceUpdate {
        /// Requested status.
        status: Option<String>,
    },
    /// Keepalive; extends the caller's presence TTL.
    #[serde(rename = "heartbeat")]
    Heartbeat,
    /// Report that messages reached this device.
    #[serde(rename = "message:delivered")]
    MessageDelivered {
        /// The messages that arrived.
        message_ids: Vec<MessageId>,
    },
    /// Mark every message in a conversation as read.
    #[serde(rename = "conversation:read")]
    ConversationRead {
        /// The conversation that was read.
        conversation_id: ConversationId,
    },
}

/// Presence of one user, as carried in snapshots and change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    /// The user whose presence this is.
    pub user_id: UserId,
    /// Current status.
    pub status: PresenceStatus,
    /// When the status last changed.
    pub timestamp: DateTime<Utc>,
}

/// Machine-readable error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A required field was absent from the event.
    MissingField,
    /// The requested status is not settable.
    InvalidStatus,
    /// The caller must wait before sending another status update.
    RateLimited,
    /// The status change could not be persisted.
    UpdateFailed,
    /// The event could not be parsed.
    InvalidMessage,
    /// The connection attempt was rejected.
    AuthRejected,
}

/// Events sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Authentication succeeded; the session is live.
    #[serde(rename = "auth:success")]
    AuthSuccess {
        /// Authenticated user.
        user_id: UserId,
        /// Display username.
        username: String,
        /// When the session was accepted.
        connected_at: DateTime<Utc>,
    },
    /// Initial snapshot of the caller's currently-online contacts.
    #[serde(rename = "presence:bulk")]
    PresenceBulk {
        /// One entry per contact with a live presence record.
        presences: Vec<PresencePayload>,
    },
    /// Confirmation of the caller's own status change.
    #[serde(rename = "presence:updated")]
    PresenceUpdated {
        /// The caller.
        user_id: UserId,
        /// The new status.
        status: PresenceStatus,
        /// When the change was applied.
        timestamp: DateTime<Utc>,
    },
    /// A contact's status changed.
    #[serde(rename = "presence:changed")]
    PresenceChanged {
        /// The contact whose status changed.
        user_id: UserId,
        /// Their new status.
        status: PresenceStatus,
        /// When the change was applied.
        timestamp: DateTime<Utc>,
    },
    /// Delivery progression of messages the receiver sent.
    #[serde(rename = "message:status")]
    MessageStatus {
        /// The affected messages.
        message_ids: Vec<MessageId>,
        /// The recipient whose state advanced.
        user_id: UserId,
        /// The state reached.
        status: DeliveryStatus,
        /// When the transition was applied.
        timestamp: DateTime<Utc>,
    },
    /// A recoverable error in response to a client event.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
    /// The server is closing this session.
    #[serde(rename = "force:disconnect")]
    ForceDisconnect {
        /// Why the session is being closed.
        reason: String,
        /// When the disconnect was initiated.
        timestamp: DateTime<Utc>,
    },
    /// The server is shutting down.
    #[serde(rename = "server:shutdown")]
    ServerShutdown {
        /// Operator-facing message.
        message: String,
        /// When shutdown began.
        timestamp: DateTime<Utc>,
    },
}
