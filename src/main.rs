/// Entry point for the Docksphinx monitoring daemon.
///
/// Polls the local Docker daemon, detects container lifecycle transitions and
/// threshold breaches, and serves the resulting events over a Unix socket.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid configuration, Docker
/// unreachable, socket path not writable).
///
/// # Examples
///
/// ```bash
/// DOCKSPHINX_CONFIG=/etc/docksphinx.json RUST_LOG=info cargo run --bin docksphinx
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    docksphinx::run().await
}
