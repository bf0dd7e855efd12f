//! Access to the Docker daemon.
//!
//! The engine only talks to Docker through the [`DockerClient`] trait. The production
//! implementation is [`BollardClient`]; tests substitute an in-memory fake.
mod client;
mod error;
pub mod stats;

use serde::Deserialize;

pub use client::BollardClient;
pub use error::{Error, Result};

use crate::container::ContainerID;

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub id: ContainerID,
    pub name: String,
    pub image: String,
    /// Lifecycle state, e.g. `running` or `exited`.
    pub state: String,
    pub status: String,
    /// Creation time in UNIX epoch seconds.
    pub created_at: i64,
}

/// A resource usage snapshot of one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

/// Restricts which containers are listed.
///
/// A container matches if its name contains any of `names` and its image contains
/// any of `images`. An empty list matches everything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContainerFilter {
    pub names: Vec<String>,
    pub images: Vec<String>,
}

impl ContainerFilter {
    pub fn matches(&self, name: &str, image: &str) -> bool {
        let name_ok = self.names.is_empty() || self.names.iter().any(|n| name.contains(n.as_str()));
        let image_ok =
            self.images.is_empty() || self.images.iter().any(|i| image.contains(i.as_str()));
        name_ok && image_ok
    }
}

/// The operations the engine needs from Docker.
pub trait DockerClient: Send + Sync + 'static {
    /// Lists all containers, running or not, that match `filter`.
    fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> impl std::future::Future<Output = Result<Vec<ContainerSummary>>> + Send;

    /// Takes a single stats snapshot of a running container.
    fn container_stats(
        &self,
        container_id: &ContainerID,
    ) -> impl std::future::Future<Output = Result<ContainerStats>> + Send;
}
