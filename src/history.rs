//! Bounded in-memory buffer of the most recent events.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::event::Event;

#[derive(Debug)]
pub struct EventHistory {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event`, evicting the oldest entry when full.
    pub fn push(&self, event: Event) {
        let mut events = self.events();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns up to `limit` of the newest events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let events = self.events();
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    /// Records everything `broadcaster` distributes until it shuts down.
    pub fn spawn_recorder(self: &Arc<Self>, broadcaster: &Broadcaster) -> JoinHandle<()> {
        let (mut rx, unsubscribe) = broadcaster.subscribe();
        let history = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                history.push(event);
            }
            unsubscribe.unsubscribe();
            log::debug!("History recorder stopped with {} events", history.len());
        })
    }
}
