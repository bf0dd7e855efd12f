use crate::container::ContainerState;
use crate::event::Event;
use crate::proto;

impl From<&Event> for proto::Event {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id().to_owned(),
            kind: event.kind().as_str().to_owned(),
            timestamp: Some(event.timestamp().into()),
            container_id: event.container_id().to_string(),
            container_name: event.container_name().to_owned(),
            image: event.image().to_owned(),
            data: event
                .data()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            message: event.message().to_owned(),
        }
    }
}

impl From<&ContainerState> for proto::ContainerInfo {
    fn from(state: &ContainerState) -> Self {
        Self {
            container_id: state.container_id.to_string(),
            name: state.name.clone(),
            image: state.image.clone(),
            state: state.state.clone(),
            status: state.status.clone(),
            last_seen: Some(state.last_seen.into()),
            cpu_percent: state.cpu_percent,
            memory_usage: state.memory_usage,
            memory_limit: state.memory_limit,
            memory_percent: state.memory_percent,
            network_rx: state.network_rx,
            network_tx: state.network_tx,
        }
    }
}
