//! Thread-safe store of the current per-container state.
//!
//! [`StateManager`] keeps exactly one [`ContainerState`] per container id. Records are
//! stored behind an [`Arc`] so snapshots can be handed out without copying them and
//! without holding any lock while the caller iterates.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::container::{ContainerID, ContainerState};
use crate::detector;
use crate::event::Event;

/// Keyed store of the latest observed state of every tracked container.
#[derive(Debug, Default)]
pub struct StateManager {
    containers: DashMap<ContainerID, Arc<ContainerState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current record for `container_id`, if tracked.
    pub fn get(&self, container_id: &str) -> Option<Arc<ContainerState>> {
        self.containers
            .get(container_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Stores `state` under `container_id`, replacing any previous record.
    ///
    /// Returns `true` if the container was not tracked before or its lifecycle
    /// `state` differs from the previous record. Metric-only changes return `false`.
    pub fn update(&self, container_id: ContainerID, state: ContainerState) -> bool {
        let record = Arc::new(state);
        let previous = self.containers.insert(container_id, Arc::clone(&record));
        previous.is_none_or(|previous| previous.state != record.state)
    }

    pub fn remove(&self, container_id: &str) {
        self.containers.remove(container_id);
    }

    /// Returns a new map sharing the stored records.
    ///
    /// The records are shared with the poll task and must be treated as read-only.
    pub fn get_all(&self) -> HashMap<ContainerID, Arc<ContainerState>> {
        self.containers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Removes every container whose id is not in `seen` and returns the removed ids.
    pub fn retain_seen(&self, seen: &HashSet<ContainerID>) -> Vec<ContainerID> {
        let mut removed = Vec::new();
        self.containers.retain(|container_id, _| {
            if seen.contains(container_id) {
                true
            } else {
                removed.push(container_id.clone());
                false
            }
        });
        removed
    }

    /// Runs the transition detector for `current` against the stored record.
    ///
    /// Must be called before `current` is written with [`StateManager::update`].
    pub fn detect_changes(&self, current: &ContainerState, now: SystemTime) -> Vec<Event> {
        let previous = self.get(current.container_id.as_str());
        detector::detect(previous.as_deref(), current, now)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, state: &str) -> ContainerState {
        ContainerState::new(
            ContainerID::new(id).unwrap(),
            "web",
            "nginx:latest",
            state,
            "",
            SystemTime::now(),
        )
    }

    #[test]
    fn test_update_reports_new_container() {
        let manager = StateManager::new();
        assert!(manager.update(ContainerID::new("c1").unwrap(), record("c1", "running")));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_update_ignores_metric_only_changes() {
        let manager = StateManager::new();
        let id = ContainerID::new("c1").unwrap();
        manager.update(id.clone(), record("c1", "running"));

        let mut next = record("c1", "running");
        next.cpu_percent = 87.5;
        next.memory_usage = 1024;
        assert!(!manager.update(id.clone(), next));
        assert_eq!(manager.get("c1").unwrap().cpu_percent, 87.5);
    }

    #[test]
    fn test_update_reports_state_change() {
        let manager = StateManager::new();
        let id = ContainerID::new("c1").unwrap();
        manager.update(id.clone(), record("c1", "running"));
        assert!(manager.update(id, record("c1", "exited")));
    }

    #[test]
    fn test_empty_manager_is_harmless() {
        let manager = StateManager::default();
        assert!(manager.get("missing").is_none());
        manager.remove("missing");
        assert!(manager.get_all().is_empty());
        assert!(manager.retain_seen(&HashSet::new()).is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_get_all_is_detached_from_later_writes() {
        let manager = StateManager::new();
        let id = ContainerID::new("c1").unwrap();
        manager.update(id.clone(), record("c1", "running"));

        let snapshot = manager.get_all();
        manager.update(id.clone(), record("c1", "exited"));
        manager.remove("c1");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&id].state, "running");
    }

    #[test]
    fn test_retain_seen_removes_missing() {
        let manager = StateManager::new();
        let c1 = ContainerID::new("c1").unwrap();
        let c2 = ContainerID::new("c2").unwrap();
        manager.update(c1.clone(), record("c1", "running"));
        manager.update(c2.clone(), record("c2", "running"));

        let seen = HashSet::from([c1.clone()]);
        let removed = manager.retain_seen(&seen);

        assert_eq!(removed, vec![c2]);
        assert!(manager.get("c1").is_some());
        assert!(manager.get("c2").is_none());
    }
}
