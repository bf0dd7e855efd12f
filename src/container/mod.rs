use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::docker::ContainerStats;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Lifecycle state Docker reports for a running container.
pub const STATE_RUNNING: &str = "running";
/// Lifecycle state of a container whose main process exited.
pub const STATE_EXITED: &str = "exited";
/// Lifecycle state of a container Docker could not clean up.
pub const STATE_DEAD: &str = "dead";

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use docksphinx::container::ContainerID;
/// let container_id = ContainerID::new("4f0c2a8e91d3").unwrap();
/// assert_eq!(container_id.as_ref(), "4f0c2a8e91d3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyContainerID`] for an empty input and
    /// [`Error::InvalidContainerID`] if the length exceeds [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() {
            return Err(Error::EmptyContainerID);
        }
        if src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The engine's current view of one container.
///
/// Besides identity, lifecycle and the latest metric sample, the record owns the
/// hysteresis bookkeeping used by [`crate::threshold::ThresholdMonitor`]. Each poll
/// builds a fresh record and carries only that bookkeeping forward.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerState {
    pub container_id: ContainerID,
    pub name: String,
    pub image: String,
    /// Lifecycle state, e.g. `running`, `exited`, `dead`.
    pub state: String,
    /// Human readable status, e.g. `Up 3 minutes`.
    pub status: String,
    pub last_seen: SystemTime,

    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,

    pub cpu_consecutive_count: u32,
    pub memory_consecutive_count: u32,
    /// When the last CPU threshold event fired, `None` if it never did.
    pub last_cpu_alert: Option<SystemTime>,
    /// When the last memory threshold event fired, `None` if it never did.
    pub last_memory_alert: Option<SystemTime>,
}

impl ContainerState {
    /// Creates a record with zeroed metrics and fresh threshold bookkeeping.
    pub fn new(
        container_id: ContainerID,
        name: impl Into<String>,
        image: impl Into<String>,
        state: impl Into<String>,
        status: impl Into<String>,
        last_seen: SystemTime,
    ) -> Self {
        Self {
            container_id,
            name: name.into(),
            image: image.into(),
            state: state.into(),
            status: status.into(),
            last_seen,
            cpu_percent: 0.0,
            memory_usage: 0,
            memory_limit: 0,
            memory_percent: 0.0,
            network_rx: 0,
            network_tx: 0,
            cpu_consecutive_count: 0,
            memory_consecutive_count: 0,
            last_cpu_alert: None,
            last_memory_alert: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }

    /// Copies the metric sample into this record.
    pub fn apply_stats(&mut self, stats: &ContainerStats) {
        self.cpu_percent = stats.cpu_percent;
        self.memory_usage = stats.memory_usage;
        self.memory_limit = stats.memory_limit;
        self.memory_percent = stats.memory_percent;
        self.network_rx = stats.network_rx;
        self.network_tx = stats.network_tx;
    }

    /// Takes over the threshold counters and alert timestamps of `previous` verbatim.
    pub fn carry_thresholds_from(&mut self, previous: &ContainerState) {
        self.cpu_consecutive_count = previous.cpu_consecutive_count;
        self.memory_consecutive_count = previous.memory_consecutive_count;
        self.last_cpu_alert = previous.last_cpu_alert;
        self.last_memory_alert = previous.last_memory_alert;
    }
}
