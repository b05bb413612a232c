use tokio::sync::broadcast;
use tracing::trace;

use super::{DomainEvent, EventListener};

/// Bridges published events into a broadcast channel for push transports
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventListener for EventBus {
    fn on_event(&self, event: &DomainEvent) -> anyhow::Result<()> {
        trace!(kind = event.kind().as_str(), "event bus: forwarding");
        // Ignore errors if there are no receivers
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
