//! In-process fan-out of angle state changes.
//!
//! [`ProgressBus`] wraps a `tokio::sync::broadcast` channel. Publishing never
//! blocks: a subscriber that falls behind loses the oldest events and keeps
//! going. There is no replay, so a subscriber that reconnects should re-read
//! full state from the job store.

mod event;

pub use event::ProgressEvent;

use tokio::sync::broadcast;

/// Events buffered per subscriber before the slowest one starts lagging.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send to all current subscribers. Returns how many received it (0 when nobody listens).
    pub fn publish(&self, event: ProgressEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event published from now until the handle is dropped.
    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Subscriber handle. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ProgressSubscription {
    rx: broadcast::Receiver<ProgressEvent>,
}

impl ProgressSubscription {
    /// Next event, or None once every bus handle is gone. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); None when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "progress subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
