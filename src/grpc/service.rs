use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::SystemTime;

use futures::Stream;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

use crate::broadcast::{Broadcaster, Unsubscribe};
use crate::event::Event;
use crate::history::EventHistory;
use crate::proto;
use crate::proto::docksphinx_server::{Docksphinx, DocksphinxServer};
use crate::state::StateManager;

/// Server side of the `docksphinx.v1.Docksphinx` service.
#[derive(Debug)]
pub struct DocksphinxService {
    broadcaster: Arc<Broadcaster>,
    state_manager: Arc<StateManager>,
    history: Arc<EventHistory>,
    recent_event_limit: usize,
}

impl DocksphinxService {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        state_manager: Arc<StateManager>,
        history: Arc<EventHistory>,
        recent_event_limit: usize,
    ) -> Self {
        Self {
            broadcaster,
            state_manager,
            history,
            recent_event_limit,
        }
    }

    pub fn into_server(self) -> DocksphinxServer<Self> {
        DocksphinxServer::new(self)
    }
}

/// Response stream of one `StreamEvents` call.
///
/// Owns one broadcaster subscription and releases it when dropped, which is how
/// tonic reports a disconnected client.
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
    unsubscribe: Unsubscribe,
    containers: Vec<String>,
}

impl EventStream {
    fn wants(&self, event: &Event) -> bool {
        self.containers.is_empty()
            || self.containers.iter().any(|c| {
                c.as_str() == event.container_id().as_str() || c.as_str() == event.container_name()
            })
    }
}

impl Stream for EventStream {
    type Item = Result<proto::Event, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match ready!(this.rx.poll_recv(cx)) {
                Some(event) if this.wants(&event) => {
                    return Poll::Ready(Some(Ok(proto::Event::from(&event))));
                }
                Some(_) => continue,
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unsubscribe.unsubscribe();
    }
}

#[tonic::async_trait]
impl Docksphinx for DocksphinxService {
    type StreamEventsStream = EventStream;

    async fn stream_events(
        &self,
        request: Request<proto::StreamEventsRequest>,
    ) -> Result<Response<Self::StreamEventsStream>, Status> {
        let containers = request.into_inner().containers;
        let (rx, unsubscribe) = self.broadcaster.subscribe();
        log::debug!(
            "Stream client subscribed as {} (filter={:?})",
            unsubscribe.id(),
            containers
        );
        Ok(Response::new(EventStream {
            rx,
            unsubscribe,
            containers,
        }))
    }

    async fn get_snapshot(
        &self,
        request: Request<proto::GetSnapshotRequest>,
    ) -> Result<Response<proto::Snapshot>, Status> {
        let limit = match request.into_inner().recent_event_limit {
            0 => self.recent_event_limit,
            n => n as usize,
        };

        let mut containers: Vec<_> = self.state_manager.get_all().into_values().collect();
        containers.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.container_id.cmp(&b.container_id))
        });

        Ok(Response::new(proto::Snapshot {
            taken_at: Some(SystemTime::now().into()),
            containers: containers
                .iter()
                .map(|c| proto::ContainerInfo::from(&**c))
                .collect(),
            recent_events: self
                .history
                .recent(limit)
                .iter()
                .map(proto::Event::from)
                .collect(),
        }))
    }
}
