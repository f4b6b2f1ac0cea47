//! Background reconciliation between socket sets and presence records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info, warn};

use super::store::PresenceStore;

/// Periodically reconcile soft state instead of relying on passive TTL
/// deletion: socket sets whose presence record already expired are
/// removed so the two views agree again.
pub async fn run_reconciler(
    presence: Arc<PresenceStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match presence.cleanup_stale().await {
                    Ok(0) => debug!("Presence reconciliation pass: nothing to do"),
                    Ok(removed) => info!(removed, "Removed orphaned socket sets"),
                    Err(e) => warn!(error = %e, "Presence reconciliation failed"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }

    debug!("Presence reconciler stopped");
}
