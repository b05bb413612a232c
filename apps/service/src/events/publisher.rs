use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

use super::DomainEvent;

/// Receives every emitted event, synchronously, on the emitting task
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listeners = Vec<(ListenerId, Arc<dyn EventListener>)>;

/// Synchronous multicast of domain events.
///
/// `emit` iterates over a snapshot, so listeners may subscribe or
/// unsubscribe from inside a callback. A failing or panicking listener is
/// logged and skipped.
#[derive(Default)]
pub struct EventPublisher {
    listeners: RwLock<Listeners>,
    next_id: AtomicU64,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().push((id, listener));
        id
    }

    pub fn subscribe_fn<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.read().len()
    }

    /// Deliver `event` to every listener, returning how many accepted it
    pub fn emit(&self, event: &DomainEvent) -> usize {
        let snapshot: Listeners = self.read().clone();
        let mut delivered = 0;

        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!("Listener {:?} failed on {} event: {:#}", id, event.kind().as_str(), e);
                }
                Err(_) => {
                    warn!("Listener {:?} panicked on {} event", id, event.kind().as_str());
                }
            }
        }

        delivered
    }

    // A listener that panicked while the lock was held must not take the
    // publisher down with it
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Listeners> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Listeners> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
