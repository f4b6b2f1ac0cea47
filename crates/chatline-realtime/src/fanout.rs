//! Presence fan-out across sessions and instances.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use chatline_core::types::UserId;

use crate::bridge::{FanoutEnvelope, PresenceBus};
use crate::connection::registry::ConnectionRegistry;
use crate::protocol::events::SessionEvent;

/// Delivers one logical event to every session of a user, on this
/// instance directly and on others through the bus.
///
/// Best effort: queue-full and cross-instance losses are logged, never
/// surfaced to the sender.
#[derive(Debug, Clone)]
pub struct PresenceFanout {
    /// Local session registry.
    registry: Arc<ConnectionRegistry>,
    /// Cross-instance bus; absent in degraded single-instance mode.
    bus: Option<Arc<dyn PresenceBus>>,
    /// This instance's identifier, used to skip its own echo.
    instance_id: String,
}

impl PresenceFanout {
    /// Create a fan-out layer.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        bus: Option<Arc<dyn PresenceBus>>,
        instance_id: String,
    ) -> Self {
        Self {
            registry,
            bus,
            instance_id,
        }
    }

    /// Deliver an event to every session of the user, everywhere.
    pub async fn send_to_user(&self, user_id: UserId, event: SessionEvent) {
        self.deliver_local(user_id, &event);

        if let Some(bus) = &self.bus {
            let envelope = FanoutEnvelope {
                origin: self.instance_id.clone(),
                user_id,
                event,
            };
            if let Err(e) = bus.publish(&envelope).await {
                warn!(user_id = %user_id, error = %e, "Fan-out publish failed");
            }
        }
    }

    /// Deliver an event to the user's sessions on this instance only.
    fn deliver_local(&self, user_id: UserId, event: &SessionEvent) {
        for handle in self.registry.sessions_for(user_id) {
            handle.send(event.clone());
        }
    }

    /// Forward bus envelopes from other instances into local sessions
    /// until shutdown. No-op without a bus.
    pub async fn run_subscriber(&self, mut shutdown: broadcast::Receiver<()>) {
        let Some(bus) = &self.bus else {
            return;
        };
        let mut rx = match bus.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "Fan-out subscriber failed to start");
                return;
            }
        };

        loop {
            tokio::select! {
                envelope = rx.recv() => {
                    match envelope {
                        Some(envelope) if envelope.origin != self.instance_id => {
                            self.deliver_local(envelope.user_id, &envelope.event);
                        }
                        Some(_) => {} // own echo
                        None => {
                            warn!("Fan-out bus closed");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        debug!("Fan-out subscriber stopped");
    }
}
