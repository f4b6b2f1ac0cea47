//! End-to-end engine tests over the in-memory state store and bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use chatline_auth::{Claims, TokenVerifier};
use chatline_core::config::auth::AuthConfig;
use chatline_core::config::presence::PresenceConfig;
use chatline_core::config::realtime::RealtimeConfig;
use chatline_core::error::ErrorKind;
use chatline_core::result::AppResult;
use chatline_core::traits::{ContactSource, DeliveryTracker, StateStore};
use chatline_core::types::delivery::{DeliveryStatus, StatusCounts};
use chatline_core::types::{ConversationId, MessageId, SessionId, UserId};
use chatline_realtime::bridge::{MemoryBus, PresenceBus};
use chatline_realtime::connection::handle::TransportKind;
use chatline_realtime::last_seen::LastSeenRecorder;
use chatline_realtime::presence::status::PresenceStatus;
use chatline_realtime::protocol::events::{ErrorCode, SessionEvent};
use chatline_realtime::protocol::handler::ActiveSession;
use chatline_realtime::server::{EngineDeps, RealtimeEngine};
use chatline_store::{MemoryStateStore, keys};

const SECRET: &str = "engine-test-secret";

#[derive(Debug, Default)]
struct FakeContacts {
    map: Mutex<HashMap<UserId, Vec<UserId>>>,
}

impl FakeContacts {
    fn set(&self, user: UserId, contacts: Vec<UserId>) {
        self.map.lock().unwrap().insert(user, contacts);
    }
}

#[async_trait]
impl ContactSource for FakeContacts {
    async fn contact_ids(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        Ok(self
            .map
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct FakeDelivery {
    entries: Mutex<HashMap<(Uuid, Uuid), DeliveryStatus>>,
    senders: Mutex<HashMap<Uuid, Uuid>>,
}

impl FakeDelivery {
    fn seed_message(&self, message: MessageId, sender: UserId, recipients: &[UserId]) {
        self.senders
            .lock()
            .unwrap()
            .insert(message.into_uuid(), sender.into_uuid());
        let mut entries = self.entries.lock().unwrap();
        for recipient in recipients {
            entries.insert(
                (message.into_uuid(), recipient.into_uuid()),
                DeliveryStatus::Sent,
            );
        }
    }
}

#[async_trait]
impl DeliveryTracker for FakeDelivery {
    async fn create_initial(
        &self,
        message_id: MessageId,
        recipient_ids: &[UserId],
    ) -> AppResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let mut created = 0;
        for recipient in recipient_ids {
            let key = (message_id.into_uuid(), recipient.into_uuid());
            if !entries.contains_key(&key) {
                entries.insert(key, DeliveryStatus::Sent);
                created += 1;
            }
        }
        Ok(created)
    }

    async fn advance(
        &self,
        message_ids: &[MessageId],
        user_id: UserId,
        status: DeliveryStatus,
    ) -> AppResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let mut changed = 0;
        for message in message_ids {
            let key = (message.into_uuid(), user_id.into_uuid());
            if let Some(current) = entries.get_mut(&key) {
                if *current != DeliveryStatus::Read && *current != status {
                    *current = status;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn mark_conversation_read(
        &self,
        _conversation_id: ConversationId,
        _user_id: UserId,
    ) -> AppResult<u64> {
        Ok(0)
    }

    async fn counts_for(&self, message_id: MessageId) -> AppResult<StatusCounts> {
        let entries = self.entries.lock().unwrap();
        let mut counts = StatusCounts::default();
        for ((message, _), status) in entries.iter() {
            if *message == message_id.into_uuid() {
                match status {
                    DeliveryStatus::Sent => counts.sent += 1,
                    DeliveryStatus::Delivered => counts.delivered += 1,
                    DeliveryStatus::Read => counts.read += 1,
                }
            }
        }
        Ok(counts)
    }

    async fn senders_for(&self, message_ids: &[MessageId]) -> AppResult<Vec<UserId>> {
        let senders = self.senders.lock().unwrap();
        let mut out = Vec::new();
        for message in message_ids {
            if let Some(sender) = senders.get(&message.into_uuid()) {
                let sender = UserId::from_uuid(*sender);
                if !out.contains(&sender) {
                    out.push(sender);
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct RecordingLastSeen {
    records: Mutex<Vec<UserId>>,
}

#[async_trait]
impl LastSeenRecorder for RecordingLastSeen {
    async fn record(&self, user_id: UserId, _at: DateTime<Utc>) {
        self.records.lock().unwrap().push(user_id);
    }
}

struct Harness {
    engine: Arc<RealtimeEngine>,
    store: Arc<MemoryStateStore>,
    contacts: Arc<FakeContacts>,
    delivery: Arc<FakeDelivery>,
    last_seen: Arc<RecordingLastSeen>,
}

fn harness() -> Harness {
    harness_on(Arc::new(MemoryStateStore::new()), None, "instance-a")
}

fn harness_on(
    store: Arc<MemoryStateStore>,
    bus: Option<Arc<dyn PresenceBus>>,
    instance_id: &str,
) -> Harness {
    let contacts = Arc::new(FakeContacts::default());
    let delivery = Arc::new(FakeDelivery::default());
    let last_seen = Arc::new(RecordingLastSeen::default());
    let verifier = Arc::new(TokenVerifier::new(&AuthConfig {
        jwt_secret: SECRET.to_string(),
        leeway_seconds: 0,
    }));

    let presence_config = PresenceConfig {
        status_update_interval_seconds: 1,
        ..PresenceConfig::default()
    };
    let engine = RealtimeEngine::new(
        EngineDeps {
            store: store.clone(),
            contact_source: contacts.clone(),
            delivery: delivery.clone(),
            verifier,
            last_seen: last_seen.clone(),
            bus,
            instance_id: instance_id.to_string(),
        },
        &presence_config,
        RealtimeConfig {
            disconnect_grace_ms: 20,
            ..RealtimeConfig::default()
        },
    );

    Harness {
        engine: Arc::new(engine),
        store,
        contacts,
        delivery,
        last_seen,
    }
}

fn token_for(user: UserId, username: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.into_uuid(),
        username: username.to_string(),
        email: None,
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn connect(
    harness: &Harness,
    user: UserId,
    username: &str,
) -> (ActiveSession, mpsc::Receiver<SessionEvent>) {
    harness
        .engine
        .attach(Some(&token_for(user, username)), TransportKind::WebSocket)
        .await
        .expect("attach should succeed")
}

async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn assert_silent(rx: &mut mpsc::Receiver<SessionEvent>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "expected no event");
}

#[tokio::test]
async fn test_authentication_primes_the_session() {
    let harness = harness();
    let user_a = UserId::new();
    let online_contact = UserId::new();
    let offline_contact = UserId::new();
    harness
        .contacts
        .set(user_a, vec![online_contact, offline_contact]);
    harness
        .engine
        .presence()
        .set_online(online_contact, SessionId::new())
        .await
        .unwrap();

    let (session, mut rx) = connect(&harness, user_a, "ada").await;
    assert_eq!(session.username(), "ada");

    match next_event(&mut rx).await {
        SessionEvent::AuthSuccess {
            user_id, username, ..
        } => {
            assert_eq!(user_id, user_a);
            assert_eq!(username, "ada");
        }
        other => panic!("expected auth:success, got {other:?}"),
    }

    match next_event(&mut rx).await {
        SessionEvent::PresenceBulk { presences } => {
            assert_eq!(presences.len(), 1, "offline contacts are omitted");
            assert_eq!(presences[0].user_id, online_contact);
            assert_eq!(presences[0].status, PresenceStatus::Online);
        }
        other => panic!("expected presence:bulk, got {other:?}"),
    }

    assert_eq!(
        harness
            .engine
            .presence()
            .get(user_a)
            .await
            .expect("record written")
            .status,
        PresenceStatus::Online
    );
}

#[tokio::test]
async fn test_each_token_failure_has_a_distinct_rejection() {
    let harness = harness();

    let missing = harness
        .engine
        .attach(None, TransportKind::WebSocket)
        .await
        .unwrap_err();
    let malformed = harness
        .engine
        .attach(Some("junk"), TransportKind::WebSocket)
        .await
        .unwrap_err();

    let expired_claims = Claims {
        sub: Uuid::new_v4(),
        username: "old".to_string(),
        email: None,
        exp: Utc::now().timestamp() - 600,
        iat: Utc::now().timestamp() - 7200,
    };
    let expired_token = encode(
        &Header::default(),
        &expired_claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let expired = harness
        .engine
        .attach(Some(&expired_token), TransportKind::WebSocket)
        .await
        .unwrap_err();

    for err in [&missing, &malformed, &expired] {
        assert_eq!(err.kind, ErrorKind::Authentication);
    }
    assert_ne!(missing.message, malformed.message);
    assert_ne!(malformed.message, expired.message);
    assert_ne!(missing.message, expired.message);

    assert_eq!(harness.engine.registry().session_count(), 0);
}

#[tokio::test]
async fn test_status_change_reaches_contacts_only() {
    let harness = harness();
    let (user_a, user_b, user_c) = (UserId::new(), UserId::new(), UserId::new());
    harness.contacts.set(user_a, vec![user_b]);

    let (session_a, mut rx_a) = connect(&harness, user_a, "ada").await;
    let (_session_b, mut rx_b) = connect(&harness, user_b, "bob").await;
    let (_session_c, mut rx_c) = connect(&harness, user_c, "cyd").await;
    for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
        next_event(rx).await; // auth:success
        next_event(rx).await; // presence:bulk
    }

    session_a
        .handle_raw(r#"{"type":"presence:update","status":"away"}"#)
        .await;

    match next_event(&mut rx_a).await {
        SessionEvent::PresenceUpdated {
            user_id, status, ..
        } => {
            assert_eq!(user_id, user_a);
            assert_eq!(status, PresenceStatus::Away);
        }
        other => panic!("expected presence:updated, got {other:?}"),
    }

    match next_event(&mut rx_b).await {
        SessionEvent::PresenceChanged {
            user_id, status, ..
        } => {
            assert_eq!(user_id, user_a);
            assert_eq!(status, PresenceStatus::Away);
        }
        other => panic!("expected presence:changed, got {other:?}"),
    }

    assert_silent(&mut rx_c).await;
}

#[tokio::test]
async fn test_status_update_validation() {
    let harness = harness();
    let user = UserId::new();
    let (session, mut rx) = connect(&harness, user, "ada").await;
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    session.handle_raw(r#"{"type":"presence:update"}"#).await;
    match next_event(&mut rx).await {
        SessionEvent::Error { code, .. } => assert_eq!(code, ErrorCode::MissingField),
        other => panic!("expected error, got {other:?}"),
    }

    session
        .handle_raw(r#"{"type":"presence:update","status":"invisible"}"#)
        .await;
    match next_event(&mut rx).await {
        SessionEvent::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidStatus),
        other => panic!("expected error, got {other:?}"),
    }

    session
        .handle_raw(r#"{"type":"presence:update","status":"offline"}"#)
        .await;
    match next_event(&mut rx).await {
        SessionEvent::Error { code, message } => {
            assert_eq!(code, ErrorCode::InvalidStatus);
            assert!(message.contains("disconnect"), "message was: {message}");
        }
        other => panic!("expected error, got {other:?}"),
    }

    session.handle_raw("not json").await;
    match next_event(&mut rx).await {
        SessionEvent::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidMessage),
        other => panic!("expected error, got {other:?}"),
    }

    // Validation failures never touched the stored status.
    assert_eq!(
        harness.engine.presence().get(user).await.unwrap().status,
        PresenceStatus::Online
    );
}

#[tokio::test]
async fn test_status_updates_are_rate_limited_per_window() {
    let harness = harness();
    let user = UserId::new();
    let (session, mut rx) = connect(&harness, user, "ada").await;
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    session
        .handle_raw(r#"{"type":"presence:update","status":"away"}"#)
        .await;
    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::PresenceUpdated { .. }
    ));

    session
        .handle_raw(r#"{"type":"presence:update","status":"busy"}"#)
        .await;
    match next_event(&mut rx).await {
        SessionEvent::Error { code, .. } => assert_eq!(code, ErrorCode::RateLimited),
        other => panic!("expected rate limit error, got {other:?}"),
    }
    // The rejected request changed nothing.
    assert_eq!(
        harness.engine.presence().get(user).await.unwrap().status,
        PresenceStatus::Away
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;
    session
        .handle_raw(r#"{"type":"presence:update","status":"busy"}"#)
        .await;
    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::PresenceUpdated {
            status: PresenceStatus::Busy,
            ..
        }
    ));
}

#[tokio::test]
async fn test_update_without_presence_record_fails_soft() {
    let harness = harness();
    let user = UserId::new();
    let (session, mut rx) = connect(&harness, user, "ada").await;
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    // The store lost track of the record (e.g. it expired mid-session).
    harness.store.delete(&keys::presence(user)).await.unwrap();

    session
        .handle_raw(r#"{"type":"presence:update","status":"away"}"#)
        .await;
    match next_event(&mut rx).await {
        SessionEvent::Error { code, .. } => assert_eq!(code, ErrorCode::UpdateFailed),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_keeps_status_untouched() {
    let harness = harness();
    let user = UserId::new();
    let (session, mut rx) = connect(&harness, user, "ada").await;
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    session
        .handle_raw(r#"{"type":"presence:update","status":"busy"}"#)
        .await;
    next_event(&mut rx).await;

    session.handle_raw(r#"{"type":"heartbeat"}"#).await;
    assert_silent(&mut rx).await;
    assert_eq!(
        harness.engine.presence().get(user).await.unwrap().status,
        PresenceStatus::Busy
    );
}

#[tokio::test]
async fn test_two_devices_one_last_seen_update() {
    let harness = harness();
    let user = UserId::new();

    let (session_1, _rx1) = connect(&harness, user, "ada").await;
    let (session_2, _rx2) = connect(&harness, user, "ada").await;

    session_1.disconnect().await;
    assert_eq!(
        harness.engine.presence().get(user).await.unwrap().status,
        PresenceStatus::Online
    );
    assert!(harness.last_seen.records.lock().unwrap().is_empty());

    session_2.disconnect().await;
    assert_eq!(
        harness.engine.presence().get(user).await.unwrap().status,
        PresenceStatus::Offline
    );
    assert_eq!(harness.last_seen.records.lock().unwrap().clone(), vec![user]);

    // Disconnect is idempotent.
    session_2.disconnect().await;
    assert_eq!(harness.last_seen.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delivery_receipt_notifies_the_sender_once() {
    let harness = harness();
    let (sender, recipient) = (UserId::new(), UserId::new());
    let message = MessageId::new();
    harness.delivery.seed_message(message, sender, &[recipient]);

    let (_session_s, mut rx_s) = connect(&harness, sender, "sam").await;
    let (session_r, mut rx_r) = connect(&harness, recipient, "rey").await;
    for rx in [&mut rx_s, &mut rx_r] {
        next_event(rx).await;
        next_event(rx).await;
    }

    let receipt = format!(
        r#"{{"type":"message:delivered","message_ids":["{}"]}}"#,
        message
    );
    session_r.handle_raw(&receipt).await;

    match next_event(&mut rx_s).await {
        SessionEvent::MessageStatus {
            message_ids,
            user_id,
            status,
            ..
        } => {
            assert_eq!(message_ids, vec![message]);
            assert_eq!(user_id, recipient);
            assert_eq!(status, DeliveryStatus::Delivered);
        }
        other => panic!("expected message:status, got {other:?}"),
    }

    // Replaying the receipt changes nothing and stays silent.
    session_r.handle_raw(&receipt).await;
    assert_silent(&mut rx_s).await;

    let counts = harness.delivery.counts_for(message).await.unwrap();
    assert_eq!(
        counts,
        StatusCounts {
            sent: 0,
            delivered: 1,
            read: 0
        }
    );
}

#[tokio::test]
async fn test_force_disconnect_delivers_notice_first() {
    let harness = harness();
    let user = UserId::new();
    let (_session, mut rx) = connect(&harness, user, "ada").await;
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    let closed = harness.engine.force_disconnect(user, "logged in elsewhere").await;
    assert_eq!(closed, 1);

    match next_event(&mut rx).await {
        SessionEvent::ForceDisconnect { reason, .. } => {
            assert_eq!(reason, "logged in elsewhere");
        }
        other => panic!("expected force:disconnect, got {other:?}"),
    }
    assert!(harness.engine.registry().sessions_for(user).is_empty());
}

#[tokio::test]
async fn test_stop_notifies_sessions_and_clears_registry() {
    let harness = harness();
    let user = UserId::new();
    let (_session, mut rx) = connect(&harness, user, "ada").await;
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    harness.engine.start();
    harness.engine.stop(Duration::from_millis(20)).await;

    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::ServerShutdown { .. }
    ));
    assert_eq!(harness.engine.registry().session_count(), 0);
}

#[tokio::test]
async fn test_presence_change_crosses_instances() {
    let store = Arc::new(MemoryStateStore::new());
    let bus: Arc<dyn PresenceBus> = Arc::new(MemoryBus::new(64));
    let harness_a = harness_on(store.clone(), Some(bus.clone()), "instance-a");
    let harness_b = harness_on(store, Some(bus), "instance-b");
    harness_a.engine.start();
    harness_b.engine.start();
    tokio::task::yield_now().await;

    let (user_a, user_b) = (UserId::new(), UserId::new());
    harness_a.contacts.set(user_a, vec![user_b]);

    let (session_a, mut rx_a) = connect(&harness_a, user_a, "ada").await;
    let (_session_b, mut rx_b) = connect(&harness_b, user_b, "bob").await;
    for rx in [&mut rx_a, &mut rx_b] {
        next_event(rx).await;
        next_event(rx).await;
    }

    session_a
        .handle_raw(r#"{"type":"presence:update","status":"busy"}"#)
        .await;
    next_event(&mut rx_a).await; // confirmation

    match next_event(&mut rx_b).await {
        SessionEvent::PresenceChanged {
            user_id, status, ..
        } => {
            assert_eq!(user_id, user_a);
            assert_eq!(status, PresenceStatus::Busy);
        }
        other => panic!("expected presence:changed, got {other:?}"),
    }

    harness_a.engine.stop(Duration::ZERO).await;
    harness_b.engine.stop(Duration::ZERO).await;
}
