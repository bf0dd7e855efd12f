//! RPC surface of the daemon.
//!
//! The server listens on a Unix domain socket. Clients reach it through a custom
//! connector since tonic endpoints only dial TCP on their own.
mod convert;
mod error;
mod service;

use std::path::{Path, PathBuf};
use std::{pin, task};

use hyper_util::rt::TokioIo;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::{Channel, Endpoint, Server};

pub use error::{Error, Result};
pub use service::{DocksphinxService, EventStream};

use crate::proto::docksphinx_client::DocksphinxClient;

#[derive(Debug, Clone)]
struct UnixConnector {
    path: PathBuf,
}

impl tower::Service<hyper::Uri> for UnixConnector {
    type Response = TokioIo<tokio::net::UnixStream>;

    type Error = std::io::Error;

    type Future = pin::Pin<Box<dyn Future<Output = std::io::Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<std::io::Result<()>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: hyper::Uri) -> Self::Future {
        let path = self.path.clone();
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(path).await?;

            Ok(TokioIo::new(stream))
        })
    }
}

/// Opens a channel to the daemon listening at `path`.
pub async fn channel_for_unix_socket(path: impl AsRef<Path>) -> Result<Channel> {
    let path = path.as_ref();
    log::debug!("Connecting to {}...", path.display());
    let connector = UnixConnector {
        path: path.to_path_buf(),
    };
    // the authority is ignored, every request goes through the connector
    let channel = Endpoint::from_static("http://[::]:50051")
        .connect_with_connector(connector)
        .await
        .map_err(|source| Error::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    log::debug!("Created channel for {}.", path.display());

    Ok(channel)
}

/// Connects a typed client to the daemon listening at `path`.
pub async fn connect(path: impl AsRef<Path>) -> Result<DocksphinxClient<Channel>> {
    Ok(DocksphinxClient::new(channel_for_unix_socket(path).await?))
}

/// Serves `service` on a Unix socket at `path` until `shutdown` resolves.
///
/// A stale socket file left behind by a previous run is replaced.
pub async fn serve(
    service: DocksphinxService,
    path: impl AsRef<Path>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::SocketPath {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed stale socket {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(Error::SocketPath {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let listener = tokio::net::UnixListener::bind(path).map_err(|source| Error::Bind {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("RPC server listening on {}", path.display());

    Server::builder()
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
        .await
        .map_err(Error::Serve)?;

    if let Err(err) = std::fs::remove_file(path) {
        log::debug!("failed to remove socket {}: {}", path.display(), err);
    }
    log::info!("RPC server stopped");
    Ok(())
}
