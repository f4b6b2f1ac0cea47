//! Per-session protocol handling.
//!
//! Each connected session runs as its own unit of work: the transport
//! feeds inbound events into [`ActiveSession`] and drains outbound events
//! from the receiver returned at open. One session blocking on the shared
//! store never blocks another.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chatline_auth::IdentityVerifier;
use chatline_core::error::AppError;
use chatline_core::result::AppResult;
use chatline_core::traits::DeliveryTracker;
use chatline_core::types::delivery::DeliveryStatus;
use chatline_core::types::{ConversationId, MessageId, SessionId, UserId};

use crate::connection::handle::{SessionHandle, TransportKind};
use crate::connection::registry::ConnectionRegistry;
use crate::fanout::PresenceFanout;
use crate::last_seen::LastSeenRecorder;
use crate::presence::contacts::ContactCache;
use crate::presence::status::{PresenceRecord, PresenceStatus};
use crate::presence::store::PresenceStore;

use super::events::{ErrorCode, InboundEvent, PresencePayload, SessionEvent};
use super::rate_limit::StatusRateLimiter;

/// Shared dependencies of every session handler.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Local session registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Presence store.
    pub presence: Arc<PresenceStore>,
    /// Contact cache.
    pub contacts: Arc<ContactCache>,
    /// Status update limiter.
    pub limiter: Arc<StatusRateLimiter>,
    /// Fan-out layer.
    pub fanout: Arc<PresenceFanout>,
    /// Message delivery tracker.
    pub delivery: Arc<dyn DeliveryTracker>,
    /// Last-seen hook.
    pub last_seen: Arc<dyn LastSeenRecorder>,
    /// Maximum in-flight contact deliveries per broadcast.
    pub fanout_concurrency: usize,
}

/// One authenticated session.
///
/// `Connecting → Authenticated → Disconnected`: construction via
/// [`ActiveSession::open`] performs the authenticated transition, and
/// [`ActiveSession::disconnect`] is terminal.
#[derive(Debug)]
pub struct ActiveSession {
    ctx: SessionContext,
    handle: Arc<SessionHandle>,
    username: String,
    disconnected: AtomicBool,
}

impl ActiveSession {
    /// Authenticate a connection attempt and bring the session live.
    ///
    /// On success the session is registered, marked online, and primed
    /// with `auth:success` plus a snapshot of its online contacts; the
    /// returned receiver carries all outbound events for the transport to
    /// deliver. On failure the error's message is the rejection to send
    /// before completing the transport handshake; each token failure kind
    /// produces a distinct message.
    pub async fn open(
        ctx: SessionContext,
        verifier: &dyn IdentityVerifier,
        token: Option<&str>,
        transport: TransportKind,
        buffer: usize,
    ) -> AppResult<(Self, mpsc::Receiver<SessionEvent>)> {
        let identity = verifier
            .verify(token)
            .map_err(|e| AppError::authentication(e.to_string()))?;

        let (tx, rx) = mpsc::channel(buffer);
        let handle = Arc::new(SessionHandle::new(identity.user_id, transport, tx));

        let outcome = ctx.registry.register(handle.clone());
        if outcome.first_for_user {
            debug!(user_id = %identity.user_id, "User came online on this instance");
        }

        // Presence is best-effort: the connection is accepted even when
        // the shared store cannot record it.
        if let Err(e) = ctx
            .presence
            .set_online(identity.user_id, handle.session_id)
            .await
        {
            warn!(
                user_id = %identity.user_id,
                error = %e,
                "Could not record presence, continuing"
            );
        }

        handle.send(SessionEvent::AuthSuccess {
            user_id: identity.user_id,
            username: identity.username.clone(),
            connected_at: handle.connected_at,
        });

        let session = Self {
            ctx,
            handle,
            username: identity.username,
            disconnected: AtomicBool::new(false),
        };
        session.send_presence_snapshot().await;

        Ok((session, rx))
    }

    /// The session's user.
    pub fn user_id(&self) -> UserId {
        self.handle.user_id
    }

    /// The session's ID.
    pub fn session_id(&self) -> SessionId {
        self.handle.session_id
    }

    /// The authenticated username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The underlying session handle.
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Process one raw frame from the client.
    pub async fn handle_raw(&self, raw: &str) {
        match serde_json::from_str::<InboundEvent>(raw) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                self.reject(ErrorCode::InvalidMessage, format!("Could not parse event: {e}"));
            }
        }
    }

    /// Process one inbound event.
    ///
    /// The transport must call this sequentially per session so events are
    /// handled in receipt order; there is no cross-session ordering.
    pub async fn handle_event(&self, event: InboundEvent) {
        self.handle.touch();
        match event {
            InboundEvent::PresenceUpdate { status } => self.handle_status_update(status).await,
            InboundEvent::Heartbeat => self.handle_heartbeat().await,
            InboundEvent::MessageDelivered { message_ids } => {
                self.handle_receipt(message_ids, DeliveryStatus::Delivered)
                    .await;
            }
            InboundEvent::ConversationRead { conversation_id } => {
                self.handle_conversation_read(conversation_id).await;
            }
        }
    }

    /// Tear the session down: unregister, update presence, and notify the
    /// last-seen hook when this was the user's final session. Idempotent.
    pub async fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ctx
            .registry
            .unregister(self.user_id(), self.session_id());
        self.handle.mark_dead();

        match self
            .ctx
            .presence
            .set_offline(self.user_id(), self.session_id())
            .await
        {
            Ok(true) => {
                self.ctx.limiter.forget(self.user_id());
                self.ctx.last_seen.record(self.user_id(), Utc::now()).await;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    user_id = %self.user_id(),
                    error = %e,
                    "Could not record disconnect presence"
                );
            }
        }
    }

    async fn handle_status_update(&self, status: Option<String>) {
        let Some(raw) = status else {
            self.reject(ErrorCode::MissingField, "status field is required");
            return;
        };
        let Some(status) = PresenceStatus::parse(&raw) else {
            self.reject(ErrorCode::InvalidStatus, format!("Unknown status '{raw}'"));
            return;
        };
        if !status.is_settable() {
            self.reject(
                ErrorCode::InvalidStatus,
                "Status 'offline' cannot be set directly, disconnect instead",
            );
            return;
        }
        if !self.ctx.limiter.try_accept(self.user_id()) {
            self.reject(
                ErrorCode::RateLimited,
                "Status update rejected, try again in a few seconds",
            );
            return;
        }

        match self.ctx.presence.update_status(self.user_id(), status).await {
            Ok(Some(record)) => {
                self.handle.send(SessionEvent::PresenceUpdated {
                    user_id: record.user_id,
                    status: record.status,
                    timestamp: record.updated_at,
                });
                self.broadcast_change(record).await;
            }
            Ok(None) => {
                self.reject(ErrorCode::UpdateFailed, "No live presence to update");
            }
            Err(e) => {
                warn!(user_id = %self.user_id(), error = %e, "Status update failed");
                self.reject(ErrorCode::UpdateFailed, "Failed to update status");
            }
        }
    }

    async fn handle_heartbeat(&self) {
        let refreshed = self
            .ctx
            .presence
            .refresh_heartbeat(self.user_id(), self.session_id())
            .await;
        if !refreshed {
            // The client's own reconnect logic is the backstop.
            debug!(
                user_id = %self.user_id(),
                session_id = %self.session_id(),
                "Heartbeat did not refresh presence"
            );
        }
    }

    /// Apply a delivery receipt and notify the affected senders.
    ///
    /// Store failures are logged, not surfaced; receipts are best effort
    /// and the client retries with its next batch.
    async fn handle_receipt(&self, message_ids: Vec<MessageId>, status: DeliveryStatus) {
        let changed = match self
            .ctx
            .delivery
            .advance(&message_ids, self.user_id(), status)
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                warn!(user_id = %self.user_id(), error = %e, "Delivery receipt failed");
                return;
            }
        };
        if changed == 0 {
            return;
        }

        let senders = match self.ctx.delivery.senders_for(&message_ids).await {
            Ok(senders) => senders,
            Err(e) => {
                warn!(user_id = %self.user_id(), error = %e, "Sender lookup failed");
                return;
            }
        };

        let timestamp = Utc::now();
        for sender in senders {
            if sender == self.user_id() {
                continue;
            }
            self.ctx
                .fanout
                .send_to_user(
                    sender,
                    SessionEvent::MessageStatus {
                        message_ids: message_ids.clone(),
                        user_id: self.user_id(),
                        status,
                        timestamp,
                    },
                )
                .await;
        }
    }

    async fn handle_conversation_read(&self, conversation_id: ConversationId) {
        match self
            .ctx
            .delivery
            .mark_conversation_read(conversation_id, self.user_id())
            .await
        {
            Ok(changed) => {
                debug!(
                    user_id = %self.user_id(),
                    conversation_id = %conversation_id,
                    changed,
                    "Conversation marked read"
                );
            }
            Err(e) => {
                warn!(
                    user_id = %self.user_id(),
                    conversation_id = %conversation_id,
                    error = %e,
                    "Mark-conversation-read failed"
                );
            }
        }
    }

    /// Push the initial snapshot of currently-online contacts.
    async fn send_presence_snapshot(&self) {
        let contacts = match self.ctx.contacts.contacts(self.user_id()).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(
                    user_id = %self.user_id(),
                    error = %e,
                    "Could not load contacts for snapshot"
                );
                Vec::new()
            }
        };

        let presences: Vec<PresencePayload> = self
            .ctx
            .presence
            .get_bulk(&contacts)
            .await
            .into_values()
            .filter(|record| record.status != PresenceStatus::Offline)
            .map(|record| PresencePayload {
                user_id: record.user_id,
                status: record.status,
                timestamp: record.updated_at,
            })
            .collect();

        self.handle.send(SessionEvent::PresenceBulk { presences });
    }

    /// Fan a status change out to the user's contacts.
    ///
    /// Fire and forget: delivery runs detached with bounded concurrency,
    /// and one contact's failure never aborts the rest.
    async fn broadcast_change(&self, record: PresenceRecord) {
        let contacts = match self.ctx.contacts.contacts(record.user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(
                    user_id = %record.user_id,
                    error = %e,
                    "Could not load contacts for broadcast"
                );
                return;
            }
        };
        if contacts.is_empty() {
            return;
        }

        let fanout = self.ctx.fanout.clone();
        let concurrency = self.ctx.fanout_concurrency;
        tokio::spawn(async move {
            futures::stream::iter(contacts)
                .for_each_concurrent(concurrency, |contact| {
                    let fanout = fanout.clone();
                    let event = SessionEvent::PresenceChanged {
                        user_id: record.user_id,
                        status: record.status,
                        timestamp: record.updated_at,
                    };
                    async move {
                        fanout.send_to_user(contact, event).await;
                    }
                })
                .await;
        });
    }

    fn reject(&self, code: ErrorCode, message: impl Into<String>) {
        self.handle.send(SessionEvent::Error {
            code,
            message: message.into(),
        });
    }
}
