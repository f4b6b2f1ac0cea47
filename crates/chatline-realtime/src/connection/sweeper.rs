//! Periodic stale-session sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info};

use chatline_core::config::realtime::RealtimeConfig;

use super::registry::ConnectionRegistry;

/// Run the registry sweep on an interval until shutdown.
pub async fn run_sweeper(
    registry: Arc<ConnectionRegistry>,
    config: RealtimeConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(Duration::from_secs(config.sweep_interval_seconds));
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let max_age = Duration::from_secs(config.session_max_age_seconds);
    let unresponsive_after = Duration::from_secs(config.unresponsive_after_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = registry.sweep_stale(max_age, unresponsive_after);
                if stats.swept > 0 {
                    info!(
                        swept = stats.swept,
                        retained = stats.retained,
                        "Swept stale sessions"
                    );
                } else {
                    debug!(retained = stats.retained, "Sweep pass: nothing stale");
                }
            }
            _ = shutdown.recv() => break,
        }
    }

    debug!("Session sweeper stopped");
}
