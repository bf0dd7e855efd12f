use std::pin::pin;

use bollard::Docker;
use bollard::models::{ContainerCpuStats, ContainerStatsResponse};
use bollard::query_parameters::{
    ListContainersOptions, ListContainersOptionsBuilder, StatsOptions, StatsOptionsBuilder,
};
use futures::StreamExt;

use super::stats::{self, CpuSample};
use super::{ContainerFilter, ContainerStats, ContainerSummary, DockerClient, Error, Result};
use crate::container::ContainerID;

/// [`DockerClient`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct BollardClient {
    docker: Docker,
}

impl BollardClient {
    /// Connects using the platform default (Unix socket or named pipe, honouring `DOCKER_HOST`).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(Error::Connect)?;
        Ok(Self { docker })
    }
}

impl DockerClient for BollardClient {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        let options: ListContainersOptions = ListContainersOptionsBuilder::new().all(true).build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(Error::List)?;

        Ok(containers
            .into_iter()
            .filter_map(to_summary)
            .filter(|c| filter.matches(&c.name, &c.image))
            .collect())
    }

    async fn container_stats(&self, container_id: &ContainerID) -> Result<ContainerStats> {
        // without one_shot docker waits for a second sample so precpu_stats is populated
        let options: StatsOptions = StatsOptionsBuilder::new()
            .stream(false)
            .one_shot(false)
            .build();
        let mut stream = pin!(self.docker.stats(container_id.as_str(), Some(options)));
        match stream.next().await {
            Some(Ok(response)) => Ok(to_stats(&response)),
            Some(Err(source)) => Err(Error::Stats {
                container_id: container_id.clone(),
                source,
            }),
            None => Err(Error::EmptyStats(container_id.clone())),
        }
    }
}

fn to_summary(container: bollard::models::ContainerSummary) -> Option<ContainerSummary> {
    let raw_id = container.id?;
    let id = match ContainerID::new(&raw_id) {
        Ok(id) => id,
        Err(err) => {
            log::warn!("skipping container with unusable id: {}", err);
            return None;
        }
    };
    let name = container
        .names
        .and_then(|names| names.into_iter().next())
        .map(|name| name.trim_start_matches('/').to_owned())
        .unwrap_or_else(|| id.to_string());

    Some(ContainerSummary {
        id,
        name,
        image: container.image.unwrap_or_default(),
        state: container.state.map(|s| s.to_string()).unwrap_or_default(),
        status: container.status.unwrap_or_default(),
        created_at: container.created.unwrap_or_default(),
    })
}

fn cpu_sample(cpu: Option<&ContainerCpuStats>) -> CpuSample {
    let Some(cpu) = cpu else {
        return CpuSample::default();
    };
    let usage = cpu.cpu_usage.as_ref();
    let online_cpus = cpu
        .online_cpus
        .map(|n| n as u32)
        .or_else(|| {
            usage
                .and_then(|u| u.percpu_usage.as_ref())
                .map(|per_cpu| per_cpu.len() as u32)
        })
        .unwrap_or(1);

    CpuSample {
        total_usage: usage.and_then(|u| u.total_usage).unwrap_or(0),
        system_usage: cpu.system_cpu_usage.unwrap_or(0),
        online_cpus,
    }
}

fn to_stats(response: &ContainerStatsResponse) -> ContainerStats {
    let cpu_percent = stats::cpu_percent(
        &cpu_sample(response.cpu_stats.as_ref()),
        &cpu_sample(response.precpu_stats.as_ref()),
    );

    let (memory_usage, memory_limit) = response
        .memory_stats
        .as_ref()
        .map(|memory| {
            (
                stats::memory_used(memory.usage.unwrap_or(0), memory.stats.as_ref()),
                memory.limit.unwrap_or(0),
            )
        })
        .unwrap_or_default();

    let (network_rx, network_tx) = response
        .networks
        .as_ref()
        .map(|networks| {
            networks.values().fold((0u64, 0u64), |(rx, tx), net| {
                (
                    rx.saturating_add(net.rx_bytes.unwrap_or(0)),
                    tx.saturating_add(net.tx_bytes.unwrap_or(0)),
                )
            })
        })
        .unwrap_or_default();

    ContainerStats {
        cpu_percent,
        memory_usage,
        memory_limit,
        memory_percent: stats::memory_percent(memory_usage, memory_limit),
        network_rx,
        network_tx,
    }
}
