//! In-memory bus for single-node deployments and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chatline_core::result::AppResult;

use super::{FanoutEnvelope, PresenceBus};

/// In-process pub/sub implementation.
#[derive(Debug)]
pub struct MemoryBus {
    /// Live subscriber channels.
    subscribers: Mutex<Vec<mpsc::Sender<FanoutEnvelope>>>,
    /// Buffer size per subscriber.
    buffer: usize,
}

impl MemoryBus {
    /// Create a new bus.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer,
        }
    }
}

#[async_trait]
impl PresenceBus for MemoryBus {
    async fn publish(&self, envelope: &FanoutEnvelope) -> AppResult<()> {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            let _ = tx.try_send(envelope.clone());
        }
        Ok(())
    }

    async fn subscribe(&self) -> AppResult<mpsc::Receiver<FanoutEnvelope>> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(tx);
        Ok(rx)
    }
}
