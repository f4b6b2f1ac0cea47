//! Redis pub/sub bus for multi-instance deployments.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chatline_core::error::{AppError, ErrorKind};
use chatline_core::result::AppResult;

use chatline_store::{RedisClient, keys};

use super::{FanoutEnvelope, PresenceBus};

/// Redis pub/sub bridge relaying fan-out envelopes between instances.
#[derive(Debug, Clone)]
pub struct RedisBus {
    /// Redis client.
    client: RedisClient,
    /// Channel carrying the envelopes.
    channel: String,
}

impl RedisBus {
    /// Create a bus over an existing Redis client.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            channel: keys::fanout_channel(),
        }
    }
}

#[async_trait]
impl PresenceBus for RedisBus {
    async fn publish(&self, envelope: &FanoutEnvelope) -> AppResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.client.conn_mut();
        redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Store, "Fan-out publish failed", e)
            })?;
        Ok(())
    }

    async fn subscribe(&self) -> AppResult<mpsc::Receiver<FanoutEnvelope>> {
        let (tx, rx) = mpsc::channel(256);
        let client = self.client.clone();
        let channel = self.channel.clone();

        tokio::spawn(async move {
            loop {
                let mut pubsub = match client.pubsub().await {
                    Ok(ps) => ps,
                    Err(e) => {
                        warn!(error = %e, "Fan-out subscription unavailable, retrying");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };
                if let Err(e) = pubsub.subscribe(&channel).await {
                    warn!(error = %e, "Fan-out channel subscribe failed, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }

                let mut messages = pubsub.on_message();
                while let Some(msg) = messages.next().await {
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "Unreadable fan-out payload");
                            continue;
                        }
                    };
                    match serde_json::from_str::<FanoutEnvelope>(&payload) {
                        Ok(envelope) => {
                            if tx.send(envelope).await.is_err() {
                                debug!("Fan-out receiver dropped, ending subscription");
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "Corrupt fan-out envelope"),
                    }
                }

                if tx.is_closed() {
                    return;
                }
                warn!("Fan-out subscription lost, reconnecting");
            }
        });

        Ok(rx)
    }
}
