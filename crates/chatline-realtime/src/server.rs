//! Top-level real-time engine and its lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use chatline_auth::IdentityVerifier;
use chatline_core::config::presence::PresenceConfig;
use chatline_core::config::realtime::RealtimeConfig;
use chatline_core::result::AppResult;
use chatline_core::traits::{ContactSource, DeliveryTracker, StateStore};
use chatline_core::types::UserId;

use crate::bridge::PresenceBus;
use crate::connection::handle::TransportKind;
use crate::connection::registry::ConnectionRegistry;
use crate::connection::sweeper::run_sweeper;
use crate::fanout::PresenceFanout;
use crate::last_seen::LastSeenRecorder;
use crate::metrics::RegistryMetrics;
use crate::presence::contacts::ContactCache;
use crate::presence::reconciler::run_reconciler;
use crate::presence::store::PresenceStore;
use crate::protocol::events::SessionEvent;
use crate::protocol::handler::{ActiveSession, SessionContext};
use crate::protocol::rate_limit::StatusRateLimiter;

/// External collaborators the engine is wired to.
#[derive(Debug, Clone)]
pub struct EngineDeps {
    /// Shared state store.
    pub store: Arc<dyn StateStore>,
    /// Authoritative contact relation.
    pub contact_source: Arc<dyn ContactSource>,
    /// Message delivery tracker.
    pub delivery: Arc<dyn DeliveryTracker>,
    /// Token verification.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Last-seen hook.
    pub last_seen: Arc<dyn LastSeenRecorder>,
    /// Cross-instance bus; `None` for single-instance mode.
    pub bus: Option<Arc<dyn PresenceBus>>,
    /// This instance's identifier.
    pub instance_id: String,
}

/// Central engine coordinating all presence subsystems.
///
/// An explicit lifecycle object: the owning process calls [`start`] once
/// after construction and [`stop`] on the way down; nothing registers
/// global shutdown hooks.
///
/// [`start`]: RealtimeEngine::start
/// [`stop`]: RealtimeEngine::stop
pub struct RealtimeEngine {
    /// Shared handler dependencies.
    ctx: SessionContext,
    /// Token verification.
    verifier: Arc<dyn IdentityVerifier>,
    /// Engine configuration.
    config: RealtimeConfig,
    /// Shutdown signal for background tasks.
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Wire up all subsystems.
    pub fn new(deps: EngineDeps, presence_config: &PresenceConfig, config: RealtimeConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let registry = Arc::new(ConnectionRegistry::new(&config));
        let presence = Arc::new(PresenceStore::new(deps.store.clone(), presence_config));
        let contacts = Arc::new(ContactCache::new(
            deps.store,
            deps.contact_source,
            presence_config,
        ));
        let limiter = Arc::new(StatusRateLimiter::new(Duration::from_secs(
            presence_config.status_update_interval_seconds,
        )));
        let fanout = Arc::new(PresenceFanout::new(
            registry.clone(),
            deps.bus,
            deps.instance_id,
        ));

        let ctx = SessionContext {
            registry,
            presence,
            contacts,
            limiter,
            fanout,
            delivery: deps.delivery,
            last_seen: deps.last_seen,
            fanout_concurrency: config.fanout_concurrency,
        };

        info!("Real-time engine initialized");
        Self {
            ctx,
            verifier: deps.verifier,
            config,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the background tasks: stale-session sweep, presence
    /// reconciliation, and the cross-instance fan-out subscriber.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("task lock poisoned");

        let registry = self.ctx.registry.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            run_sweeper(registry, config, shutdown).await;
        }));

        let presence = self.ctx.presence.clone();
        let interval = Duration::from_secs(self.config.reconcile_interval_seconds);
        let shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            run_reconciler(presence, interval, shutdown).await;
        }));

        let fanout = self.ctx.fanout.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            fanout.run_subscriber(shutdown).await;
        }));

        info!("Real-time engine started");
    }

    /// Graceful shutdown: notify every session, wait the grace period,
    /// then tear everything down.
    pub async fn stop(&self, grace: Duration) {
        info!("Shutting down real-time engine");

        let notified = self.ctx.registry.broadcast_all(&SessionEvent::ServerShutdown {
            message: "Server is shutting down".to_string(),
            timestamp: Utc::now(),
        });
        if notified > 0 && !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }

        let _ = self.shutdown_tx.send(());
        self.ctx.registry.close_all();

        let mut tasks = self.tasks.lock().expect("task lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }

        info!("Real-time engine shut down");
    }

    /// Authenticate a new connection and bring its session live.
    ///
    /// On failure the returned error's message is the rejection the
    /// transport must deliver before completing its handshake.
    pub async fn attach(
        &self,
        token: Option<&str>,
        transport: TransportKind,
    ) -> AppResult<(ActiveSession, tokio::sync::mpsc::Receiver<SessionEvent>)> {
        ActiveSession::open(
            self.ctx.clone(),
            self.verifier.as_ref(),
            token,
            transport,
            self.config.channel_buffer_size,
        )
        .await
    }

    /// Terminate every session of a user: a disconnect notice, the
    /// configured grace period, then teardown. Returns sessions closed.
    pub async fn force_disconnect(&self, user_id: UserId, reason: &str) -> usize {
        self.ctx
            .registry
            .force_disconnect(
                user_id,
                reason,
                Duration::from_millis(self.config.disconnect_grace_ms),
            )
            .await
    }

    /// Local session registry.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.ctx.registry.clone()
    }

    /// Presence store.
    pub fn presence(&self) -> Arc<PresenceStore> {
        self.ctx.presence.clone()
    }

    /// Contact cache (invalidation hook for contact mutations).
    pub fn contacts(&self) -> Arc<ContactCache> {
        self.ctx.contacts.clone()
    }

    /// Connection counters.
    pub fn metrics(&self) -> Arc<RegistryMetrics> {
        self.ctx.registry.metrics()
    }
}
