//! The polling engine.
//!
//! [`Engine`] owns one background task that periodically lists containers, refreshes
//! the [`StateManager`], runs the transition detector and the threshold monitor and
//! offers the resulting events to a bounded output queue. The poll task never blocks
//! on that queue: when it is full the event is dropped and a warning is logged.
//!
//! Shutdown order is strict: [`Engine::stop`] waits for the poll task to exit before
//! it drops the last sender of the output queue, so the consumer only observes the
//! end of the queue once no further events can be produced.
mod error;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub use error::{Error, Result};

use crate::config::{Config, EngineConfig};
use crate::container::ContainerState;
use crate::docker::{ContainerFilter, DockerClient};
use crate::error::LogErrorExt;
use crate::event::Event;
use crate::state::StateManager;
use crate::threshold::ThresholdMonitor;

/// Container monitoring engine.
pub struct Engine<D> {
    poller: Arc<Poller<D>>,
    poll_interval: Duration,
    events_tx: Mutex<Option<mpsc::Sender<Event>>>,
    events_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    task: Mutex<Option<PollTask>>,
}

struct PollTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Everything one reconciliation pass needs, shared with the poll task.
struct Poller<D> {
    docker: Arc<D>,
    filter: ContainerFilter,
    monitor: ThresholdMonitor,
    state_manager: Arc<StateManager>,
    tick_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D: DockerClient> Engine<D> {
    pub fn new(docker: Arc<D>, config: &Config) -> Self {
        let engine: &EngineConfig = &config.engine;
        let (events_tx, events_rx) = mpsc::channel(engine.event_queue_capacity.max(1));

        Self {
            poller: Arc::new(Poller {
                docker,
                filter: config.filters.clone(),
                monitor: ThresholdMonitor::new(config.thresholds.clone()),
                state_manager: Arc::new(StateManager::new()),
                tick_timeout: engine.tick_timeout(),
            }),
            poll_interval: engine.poll_interval(),
            events_tx: Mutex::new(Some(events_tx)),
            events_rx: Mutex::new(Some(events_rx)),
            task: Mutex::new(None),
        }
    }

    /// Spawns the poll task. The first poll happens immediately.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the engine is running and [`Error::Closed`]
    /// if it was stopped before, which closes the output queue for good.
    pub fn start(&self) -> Result<()> {
        let mut task = lock(&self.task);
        if task.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let events = lock(&self.events_tx).clone().ok_or(Error::Closed)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.poller),
            events,
            self.poll_interval,
            shutdown_rx,
        ));
        *task = Some(PollTask { shutdown, handle });
        log::info!(
            "Engine started: poll_interval={:?}, tick_timeout={:?}",
            self.poll_interval,
            self.poller.tick_timeout
        );
        Ok(())
    }

    /// Stops the poll task and closes the output queue.
    ///
    /// Safe to call before [`Engine::start`] and any number of times.
    pub async fn stop(&self) {
        // Both are taken under the task lock so a racing `start` either sees the
        // task it has to replace or the closed queue.
        let (task, events) = {
            let mut task = lock(&self.task);
            (task.take(), lock(&self.events_tx).take())
        };
        if let Some(PollTask { shutdown, handle }) = task {
            let _ = shutdown.send(true);
            if let Err(err) = handle.await {
                log::error!("poll task ended abnormally: {}", err);
            }
            log::info!("Engine stopped");
        }

        if events.is_some() {
            drop(events);
            log::debug!("Closed engine event queue");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).is_some()
    }

    /// Hands out the read end of the output queue. Only the first call returns it.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<Event>> {
        lock(&self.events_rx).take()
    }

    /// The state store the engine keeps up to date.
    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.poller.state_manager)
    }
}

async fn poll_loop<D: DockerClient>(
    poller: Arc<Poller<D>>,
    events: mpsc::Sender<Event>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = poller.poll_once(&events) => {}
        }
    }
    log::debug!("poll task exiting");
}

impl<D: DockerClient> Poller<D> {
    /// Runs one reconciliation pass against the current container listing.
    ///
    /// Every Docker call shares one deadline, `tick_timeout` from the start of the
    /// pass. A listing past the deadline ends the pass without touching the state;
    /// a stats call past it counts as a failed stats call.
    async fn poll_once(&self, events: &mpsc::Sender<Event>) {
        let deadline = Instant::now() + self.tick_timeout;

        let listing = tokio::time::timeout_at(deadline, self.docker.list_containers(&self.filter));
        let containers = match listing.await {
            Ok(Ok(containers)) => containers,
            Ok(Err(err)) => {
                log::error!("{}", err);
                return;
            }
            Err(_) => {
                log::error!("listing containers exceeded {:?}", self.tick_timeout);
                return;
            }
        };
        log::trace!("Listed {} containers", containers.len());

        let mut seen = HashSet::with_capacity(containers.len());
        for summary in containers {
            let now = SystemTime::now();
            let previous = self.state_manager.get(summary.id.as_str());

            let mut record = ContainerState::new(
                summary.id.clone(),
                summary.name,
                summary.image,
                summary.state,
                summary.status,
                now,
            );
            if record.is_running() {
                let stats =
                    tokio::time::timeout_at(deadline, self.docker.container_stats(&record.container_id));
                match stats.await {
                    Ok(result) => {
                        if let Some(stats) = result.log_err(log::Level::Warn) {
                            record.apply_stats(&stats);
                        }
                    }
                    Err(_) => log::warn!(
                        "stats for container `{}` exceeded the tick deadline",
                        record.container_id
                    ),
                }
            }
            if let Some(previous) = previous.as_deref() {
                record.carry_thresholds_from(previous);
            }

            let transitioned = match previous.as_deref() {
                None => record.is_running(),
                Some(previous) => previous.state != record.state,
            };
            if transitioned {
                publish(events, self.state_manager.detect_changes(&record, now));
            }
            if record.is_running() {
                publish(events, self.monitor.check(&mut record, now));
            }

            self.state_manager.update(summary.id.clone(), record);
            seen.insert(summary.id);
        }

        for container_id in self.state_manager.retain_seen(&seen) {
            log::debug!("Container `{}` disappeared, dropped its state", container_id);
        }
    }
}

fn publish(events: &mpsc::Sender<Event>, batch: Vec<Event>) {
    for event in batch {
        match events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!("event queue full, dropping event: {}", event);
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                log::warn!("event queue closed, dropping event: {}", event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerID;
    use crate::docker::{self, ContainerStats, ContainerSummary};
    use crate::event::EventKind;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeDocker {
        containers: Mutex<Vec<ContainerSummary>>,
        stats: Mutex<HashMap<String, ContainerStats>>,
        fail_listing: AtomicBool,
        hang_stats: AtomicBool,
        hang_listing: AtomicBool,
    }

    impl FakeDocker {
        fn set(&self, containers: &[(&str, &str, &str)]) {
            *self.containers.lock().unwrap() = containers
                .iter()
                .map(|(id, name, state)| ContainerSummary {
                    id: ContainerID::new(id).unwrap(),
                    name: (*name).to_owned(),
                    image: "nginx:latest".to_owned(),
                    state: (*state).to_owned(),
                    status: String::new(),
                    created_at: 0,
                })
                .collect();
        }

        fn set_cpu(&self, id: &str, cpu_percent: f64) {
            self.stats.lock().unwrap().insert(
                id.to_owned(),
                ContainerStats {
                    cpu_percent,
                    ..ContainerStats::default()
                },
            );
        }
    }

    impl DockerClient for FakeDocker {
        async fn list_containers(
            &self,
            filter: &ContainerFilter,
        ) -> docker::Result<Vec<ContainerSummary>> {
            if self.hang_listing.load(Ordering::SeqCst) {
                return std::future::pending().await;
            }
            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(docker::Error::List(
                    bollard::errors::Error::DockerResponseServerError {
                        status_code: 500,
                        message: "daemon hiccup".to_owned(),
                    },
                ));
            }
            Ok(self
                .containers
                .lock()
                .unwrap()
                .iter()
                .filter(|c| filter.matches(&c.name, &c.image))
                .cloned()
                .collect())
        }

        async fn container_stats(&self, container_id: &ContainerID) -> docker::Result<ContainerStats> {
            if self.hang_stats.load(Ordering::SeqCst) {
                return std::future::pending().await;
            }
            self.stats
                .lock()
                .unwrap()
                .get(container_id.as_str())
                .cloned()
                .ok_or_else(|| docker::Error::EmptyStats(container_id.clone()))
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.engine.poll_interval_secs = 3600;
        config.thresholds.cpu.consecutive_count = 2;
        config.thresholds.cooldown_seconds = 30;
        config
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_stop_before_start_and_twice() {
        let engine = Engine::new(Arc::new(FakeDocker::default()), &test_config());
        let mut rx = engine.take_event_receiver().unwrap();

        engine.stop().await;
        engine.stop().await;

        assert!(rx.recv().await.is_none());
        assert!(matches!(engine.start(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let engine = Engine::new(Arc::new(FakeDocker::default()), &test_config());
        let mut rx = engine.take_event_receiver().unwrap();

        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(Error::AlreadyRunning)));

        engine.stop().await;
        engine.stop().await;
        assert!(!engine.is_running());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_receiver_is_handed_out_once() {
        let engine = Engine::new(Arc::new(FakeDocker::default()), &test_config());
        assert!(engine.take_event_receiver().is_some());
        assert!(engine.take_event_receiver().is_none());
    }

    #[tokio::test]
    async fn test_start_polls_immediately() {
        let docker = Arc::new(FakeDocker::default());
        docker.set(&[("c1", "web", "running")]);
        let engine = Engine::new(Arc::clone(&docker), &test_config());
        let mut rx = engine.take_event_receiver().unwrap();

        engine.start().unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("first poll should happen right away")
            .unwrap();
        assert_eq!(event.kind(), EventKind::Started);
        assert_eq!(event.container_id().as_str(), "c1");

        engine.stop().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let docker = Arc::new(FakeDocker::default());
        let engine = Engine::new(Arc::clone(&docker), &test_config());
        let mut rx = engine.take_event_receiver().unwrap();
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running"), ("c2", "db", "created")]);
        engine.poller.poll_once(&events).await;
        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), EventKind::Started);
        assert_eq!(engine.state_manager().len(), 2);

        // metric-only change, no lifecycle event
        docker.set_cpu("c1", 10.0);
        engine.poller.poll_once(&events).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(engine.state_manager().get("c1").unwrap().cpu_percent, 10.0);

        docker.set(&[("c1", "web", "exited"), ("c2", "db", "created")]);
        engine.poller.poll_once(&events).await;
        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), EventKind::Stopped);
        assert_eq!(got[0].data()["previous_state"], "running");

        // quick restart
        docker.set(&[("c1", "web", "running"), ("c2", "db", "created")]);
        engine.poller.poll_once(&events).await;
        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), EventKind::Restarted);
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_state() {
        let docker = Arc::new(FakeDocker::default());
        let engine = Engine::new(Arc::clone(&docker), &test_config());
        let mut rx = engine.take_event_receiver().unwrap();
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running")]);
        engine.poller.poll_once(&events).await;
        drain(&mut rx);

        docker.fail_listing.store(true, Ordering::SeqCst);
        engine.poller.poll_once(&events).await;
        assert!(drain(&mut rx).is_empty());
        assert!(engine.state_manager().get("c1").is_some());
    }

    #[tokio::test]
    async fn test_missing_container_is_removed() {
        let docker = Arc::new(FakeDocker::default());
        let engine = Engine::new(Arc::clone(&docker), &test_config());
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running"), ("c2", "db", "running")]);
        engine.poller.poll_once(&events).await;
        docker.set(&[("c2", "db", "running")]);
        engine.poller.poll_once(&events).await;

        let manager = engine.state_manager();
        assert!(manager.get("c1").is_none());
        assert!(manager.get("c2").is_some());
    }

    #[tokio::test]
    async fn test_stats_failure_leaves_zeroed_metrics() {
        let docker = Arc::new(FakeDocker::default());
        let engine = Engine::new(Arc::clone(&docker), &test_config());
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running")]);
        engine.poller.poll_once(&events).await;

        let record = engine.state_manager().get("c1").unwrap();
        assert_eq!(record.cpu_percent, 0.0);
        assert_eq!(record.memory_usage, 0);
    }

    #[tokio::test]
    async fn test_threshold_counters_survive_ticks() {
        let docker = Arc::new(FakeDocker::default());
        let engine = Engine::new(Arc::clone(&docker), &test_config());
        let mut rx = engine.take_event_receiver().unwrap();
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running")]);
        docker.set_cpu("c1", 95.0);
        engine.poller.poll_once(&events).await;
        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), EventKind::Started);
        assert_eq!(engine.state_manager().get("c1").unwrap().cpu_consecutive_count, 1);

        engine.poller.poll_once(&events).await;
        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), EventKind::CpuThreshold);
        assert_eq!(got[0].data()["level"], "critical");

        // cooldown holds across ticks
        engine.poller.poll_once(&events).await;
        engine.poller.poll_once(&events).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let docker = Arc::new(FakeDocker::default());
        let mut config = test_config();
        config.engine.event_queue_capacity = 1;
        let engine = Engine::new(Arc::clone(&docker), &config);
        let mut rx = engine.take_event_receiver().unwrap();
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running"), ("c2", "db", "running")]);
        tokio::time::timeout(Duration::from_secs(5), engine.poller.poll_once(&events))
            .await
            .expect("poll must not block on a full queue");

        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(engine.state_manager().len(), 2);
    }

    #[tokio::test]
    async fn test_hung_stats_call_does_not_stall_the_tick() {
        let docker = Arc::new(FakeDocker::default());
        let mut config = test_config();
        config.engine.tick_timeout_secs = 1;
        let engine = Engine::new(Arc::clone(&docker), &config);
        let mut rx = engine.take_event_receiver().unwrap();
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c3", "cache", "exited")]);
        engine.poller.poll_once(&events).await;
        assert!(engine.state_manager().get("c3").is_some());

        docker.set(&[("c1", "web", "running"), ("c2", "db", "running")]);
        docker.set_cpu("c1", 50.0);
        docker.hang_stats.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), engine.poller.poll_once(&events))
            .await
            .expect("tick must finish once its deadline passes");

        let mut ids: Vec<String> = engine
            .state_manager()
            .get_all()
            .into_keys()
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, ["c1", "c2"]);
        assert_eq!(engine.state_manager().get("c1").unwrap().cpu_percent, 0.0);

        let got = drain(&mut rx);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| e.kind() == EventKind::Started));
    }

    #[tokio::test]
    async fn test_hung_listing_leaves_state_alone() {
        let docker = Arc::new(FakeDocker::default());
        let mut config = test_config();
        config.engine.tick_timeout_secs = 1;
        let engine = Engine::new(Arc::clone(&docker), &config);
        let events = lock(&engine.events_tx).clone().unwrap();

        docker.set(&[("c1", "web", "running")]);
        engine.poller.poll_once(&events).await;

        docker.hang_listing.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), engine.poller.poll_once(&events))
            .await
            .expect("tick must finish once its deadline passes");
        assert!(engine.state_manager().get("c1").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_racing_start_always_closes_queue() {
        for _ in 0..50 {
            let engine = Arc::new(Engine::new(Arc::new(FakeDocker::default()), &test_config()));
            let mut rx = engine.take_event_receiver().unwrap();

            let starter = tokio::spawn({
                let engine = Arc::clone(&engine);
                async move { engine.start() }
            });
            engine.stop().await;
            let _ = starter.await.unwrap();
            assert!(!engine.is_running());

            let closed = tokio::time::timeout(Duration::from_secs(5), async {
                while rx.recv().await.is_some() {}
            })
            .await;
            assert!(closed.is_ok(), "output queue stayed open");
        }
    }
}
