//! Cross-instance fan-out bridge.
//!
//! Instances never talk to each other directly; presence changes cross
//! instance boundaries only through the shared store's pub/sub mechanism.
//! Delivery is best effort with no guarantee.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use chatline_core::result::AppResult;
use chatline_core::types::UserId;

use crate::protocol::events::SessionEvent;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

/// One published fan-out item: an event for every session of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutEnvelope {
    /// Instance that published the envelope, so it can skip its own echo.
    pub origin: String,
    /// User whose sessions should receive the event.
    pub user_id: UserId,
    /// The event itself.
    pub event: SessionEvent,
}

/// Pub/sub transport for fan-out envelopes.
#[async_trait]
pub trait PresenceBus: Send + Sync + std::fmt::Debug {
    /// Publish an envelope to every instance.
    async fn publish(&self, envelope: &FanoutEnvelope) -> AppResult<()>;

    /// Receive envelopes published by any instance, own ones included.
    async fn subscribe(&self) -> AppResult<mpsc::Receiver<FanoutEnvelope>>;
}
