//! Prints Docksphinx events as they happen.
//!
//! Connects to the socket named by `DOCKSPHINX_SOCKET` (or the default path) and
//! streams events for the containers given as arguments, or for all containers if
//! none are given.
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use docksphinx::config::{DEFAULT_SOCKET_PATH, SOCKET_PATH_ENV};
use docksphinx::proto::StreamEventsRequest;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let socket = std::env::var_os(SOCKET_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));
    let containers: Vec<String> = std::env::args().skip(1).collect();

    let mut client = docksphinx::grpc::connect(&socket).await?;
    let mut stream = client
        .stream_events(StreamEventsRequest { containers })
        .await?
        .into_inner();

    while let Some(event) = stream.message().await? {
        let seconds = event
            .timestamp
            .and_then(|ts| SystemTime::try_from(ts).ok())
            .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let data = event
            .data
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{seconds} {:<14} {:<20} {} {}",
            event.kind, event.container_name, event.message, data
        );
    }

    log::info!("Daemon closed the event stream");
    Ok(())
}
