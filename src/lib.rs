//! Docksphinx: a Docker host monitor that detects container lifecycle transitions
//! and resource threshold breaches and streams them to live consumers.
//!
//! The poll [`engine`] keeps the per-container [`state`] up to date, runs the
//! [`detector`] and the [`threshold`] monitor, and hands events to the
//! [`broadcast`] fan-out, which serves every connected [`grpc`] stream.

use std::sync::Arc;

use broadcast::Broadcaster;
use config::Config;
use docker::BollardClient;
use engine::Engine;
use history::EventHistory;

pub mod broadcast;
pub mod config;
pub mod container;
pub mod detector;
pub mod docker;
pub mod engine;
pub mod error;
pub mod event;
pub mod grpc;
pub mod history;
pub mod state;
pub mod threshold;

pub mod proto {
    tonic::include_proto!("docksphinx.v1");
}

/// Runs the Docksphinx daemon until SIGINT or SIGTERM.
///
/// Shutdown happens in dependency order: the engine stops polling and closes its
/// event queue, the broadcaster drains it and closes every subscriber queue, which
/// ends all open streams, and only then the RPC server is stopped.
///
/// # Errors
///
/// Possible errors include:
/// - An invalid or unreadable configuration file.
/// - Failure to reach the Docker daemon.
/// - Failure to bind the RPC socket.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Config: {:?}", config);

    let docker = Arc::new(BollardClient::connect()?);
    let engine = Engine::new(docker, &config);
    let events = engine
        .take_event_receiver()
        .ok_or("engine event queue was already taken")?;

    let broadcaster = Arc::new(Broadcaster::new(config.daemon.subscriber_queue_capacity));
    let history = Arc::new(EventHistory::new(config.daemon.history_capacity));
    let recorder = history.spawn_recorder(&broadcaster);
    let fanout = tokio::spawn({
        let broadcaster = Arc::clone(&broadcaster);
        async move { broadcaster.run(events).await }
    });

    let service = grpc::DocksphinxService::new(
        Arc::clone(&broadcaster),
        engine.state_manager(),
        Arc::clone(&history),
        config.daemon.recent_event_limit,
    );
    let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(grpc::serve(
        service,
        config.daemon.socket_path.clone(),
        async move {
            let _ = server_stopped.await;
        },
    ));

    engine.start()?;

    let early_exit = tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            None
        }
        result = &mut server => Some(result),
    };
    log::info!("Shutting down");

    engine.stop().await;
    fanout.await??;
    recorder.await?;

    match early_exit {
        Some(result) => result??,
        None => {
            let _ = stop_server.send(());
            server.await??;
        }
    }
    log::info!("Bye");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
