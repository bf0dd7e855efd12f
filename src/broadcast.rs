//! Fan-out of engine events to any number of stream consumers.
//!
//! Every subscriber owns a bounded queue. The registry of queues sits behind a
//! reader/writer lock that is held only to mutate or snapshot it, never while an
//! event is offered to a queue, so one slow consumer cannot stall the others.
//!
//! A queue is closed by dropping its registered sender. Removal from the registry
//! and closing are one step under the write lock, which makes a double close
//! impossible: whoever removes the entry closes the queue, everyone else finds
//! nothing to remove.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use crate::event::Event;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("broadcaster is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Default)]
struct Registry {
    subscribers: HashMap<u64, mpsc::Sender<Event>>,
    /// Set once `run` has torn everything down.
    closed: bool,
}

type SharedRegistry = Arc<RwLock<Registry>>;

fn read(registry: &RwLock<Registry>) -> RwLockReadGuard<'_, Registry> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(registry: &RwLock<Registry>) -> RwLockWriteGuard<'_, Registry> {
    registry.write().unwrap_or_else(PoisonError::into_inner)
}

/// Distributes events from one source queue to many subscriber queues.
#[derive(Debug)]
pub struct Broadcaster {
    capacity: usize,
    registry: SharedRegistry,
    next_id: AtomicU64,
    started: AtomicBool,
}

/// De-registers and closes one subscriber queue.
#[derive(Debug)]
#[must_use = "the subscription stays registered until `unsubscribe` is called"]
pub struct Unsubscribe {
    id: u64,
    registry: SharedRegistry,
}

impl Unsubscribe {
    /// Removes the subscriber and closes its queue.
    ///
    /// Calling it again, or after the broadcaster shut down, does nothing.
    pub fn unsubscribe(&self) {
        let removed = write(&self.registry).subscribers.remove(&self.id);
        if removed.is_some() {
            log::debug!("Subscriber {} unsubscribed", self.id);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Broadcaster {
    /// Creates a broadcaster whose subscriber queues hold up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            registry: SharedRegistry::default(),
            next_id: AtomicU64::new(1),
            started: AtomicBool::new(false),
        }
    }

    /// Registers a new subscriber queue.
    ///
    /// After shutdown the returned queue is already closed.
    pub fn subscribe(&self) -> (mpsc::Receiver<Event>, Unsubscribe) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut registry = write(&self.registry);
        if registry.closed {
            log::debug!("Subscriber {} arrived after shutdown", id);
        } else {
            registry.subscribers.insert(id, tx);
            log::debug!(
                "Subscriber {} registered ({} total)",
                id,
                registry.subscribers.len()
            );
        }
        drop(registry);

        (
            rx,
            Unsubscribe {
                id,
                registry: Arc::clone(&self.registry),
            },
        )
    }

    /// Offers `event` to every subscriber without blocking.
    ///
    /// A full queue loses this event for that subscriber only. Returns the number of
    /// subscribers the event was delivered to.
    pub fn send(&self, event: &Event) -> usize {
        let targets: Vec<(u64, mpsc::Sender<Event>)> = read(&self.registry)
            .subscribers
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "subscriber {} is lagging, dropped event {} ({})",
                        id,
                        event.id(),
                        event.kind()
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::trace!("subscriber {} is gone, skipping", id);
                }
            }
        }
        delivered
    }

    /// Forwards every event from `source` until it closes, then closes all
    /// subscriber queues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if called a second time.
    pub async fn run(&self, mut source: mpsc::Receiver<Event>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        while let Some(event) = source.recv().await {
            log::trace!("Broadcasting {}", event);
            self.send(&event);
        }

        let mut registry = write(&self.registry);
        registry.closed = true;
        let count = registry.subscribers.len();
        registry.subscribers.clear();
        drop(registry);
        log::info!("Event source closed, shut down {} subscribers", count);
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        read(&self.registry).subscribers.len()
    }
}
