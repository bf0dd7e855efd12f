//! Monitoring events emitted by the detector and the threshold monitor.
//!
//! An [`Event`] is immutable once it leaves its producer: fields are private and
//! only readable through accessors. Consumers that need to keep an event around
//! clone it.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::container::{ContainerID, ContainerState};

/// The kind of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Stopped,
    Restarted,
    Died,
    CpuThreshold,
    MemoryThreshold,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::Restarted => "restarted",
            EventKind::Died => "died",
            EventKind::CpuThreshold => "cpu_threshold",
            EventKind::MemoryThreshold => "mem_threshold",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single monitoring event about one container.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: String,
    kind: EventKind,
    timestamp: SystemTime,
    container_id: ContainerID,
    container_name: String,
    image: String,
    data: BTreeMap<String, String>,
    message: String,
}

impl Event {
    /// Creates an event for `container` with a fresh unique id.
    pub fn new(
        kind: EventKind,
        container: &ContainerState,
        timestamp: SystemTime,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp,
            container_id: container.container_id.clone(),
            container_name: container.name.clone(),
            image: container.image.clone(),
            data: BTreeMap::new(),
            message: message.into(),
        }
    }

    /// Attaches a data entry. Only usable while the producer still owns the event.
    pub fn with_data(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.data.insert(key.into(), value.to_string());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn container_id(&self) -> &ContainerID {
        &self.container_id
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.kind, self.container_name, self.container_id, self.message
        )
    }
}
