//! Chatline server — presence and delivery-tracking core.
//!
//! Entry point that wires the crates together: configuration, logging,
//! database and state-store bring-up, and the real-time engine lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use chatline_auth::TokenVerifier;
use chatline_core::config::AppConfig;
use chatline_core::error::AppError;
use chatline_database::{ContactRepository, MessageStatusRepository};
use chatline_realtime::bridge::{PresenceBus, RedisBus};
use chatline_realtime::last_seen::NoopLastSeen;
use chatline_realtime::server::{EngineDeps, RealtimeEngine};
use chatline_store::StateStoreManager;

#[tokio::main]
async fn main() {
    let env = std::env::var("CHATLINE_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main server run function.
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        instance_id = %config.server.instance_id,
        "Starting Chatline"
    );

    tracing::info!("Connecting to database...");
    let pool = chatline_database::connection::create_pool(&config.database).await?;

    tracing::info!("Connecting to state store...");
    let store = StateStoreManager::connect(&config.store).await?;

    // Cross-instance fan-out rides the same Redis; without it we stay
    // instance-local until the store recovers.
    let bus: Option<Arc<dyn PresenceBus>> = store
        .redis_client()
        .map(|client| Arc::new(RedisBus::new(client.clone())) as Arc<dyn PresenceBus>);

    let engine = Arc::new(RealtimeEngine::new(
        EngineDeps {
            store: store.store(),
            contact_source: Arc::new(ContactRepository::new(pool.clone())),
            delivery: Arc::new(MessageStatusRepository::new(pool.clone())),
            verifier: Arc::new(TokenVerifier::new(&config.auth)),
            last_seen: Arc::new(NoopLastSeen),
            bus,
            instance_id: config.server.instance_id.clone(),
        },
        &config.presence,
        config.realtime.clone(),
    ));

    engine.start();
    tracing::info!("Chatline ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {e}")))?;

    tracing::info!("Shutdown signal received");
    engine
        .stop(Duration::from_secs(config.realtime.shutdown_grace_seconds))
        .await;
    pool.close().await;

    tracing::info!("Chatline stopped");
    Ok(())
}
