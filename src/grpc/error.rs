use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to prepare socket path `{path}`: {source}")]
    SocketPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind socket `{path}`: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to socket `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("rpc server failed: {0}")]
    Serve(#[source] tonic::transport::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
