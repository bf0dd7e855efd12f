use crate::container::ContainerID;

/// Errors returned by the Docker collaborator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to the docker daemon: {0}")]
    Connect(#[source] bollard::errors::Error),
    #[error("failed to list containers: {0}")]
    List(#[source] bollard::errors::Error),
    #[error("failed to read stats for container `{container_id}`: {source}")]
    Stats {
        container_id: ContainerID,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("docker returned no stats for container `{0}`")]
    EmptyStats(ContainerID),
}

pub type Result<T> = std::result::Result<T, Error>;
