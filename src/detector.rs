//! Maps lifecycle transitions to events.
//!
//! | previous            | current  | emits                                        |
//! |---------------------|----------|----------------------------------------------|
//! | none                | running  | `started`                                    |
//! | exited / dead       | running  | `restarted` if last seen < 10s ago, else `started` |
//! | other               | running  | `started`                                    |
//! | any                 | exited   | `stopped`                                    |
//! | any                 | dead     | `died`                                       |
//!
//! Everything else, including an unchanged state, emits nothing.
use std::time::{Duration, SystemTime};

use crate::container::{ContainerState, STATE_DEAD, STATE_EXITED, STATE_RUNNING};
use crate::event::{Event, EventKind};

/// A stopped container that runs again within this window counts as restarted.
pub const RESTART_WINDOW: Duration = Duration::from_secs(10);

/// Returns the events caused by moving from `previous` to `current`.
pub fn detect(
    previous: Option<&ContainerState>,
    current: &ContainerState,
    now: SystemTime,
) -> Vec<Event> {
    let Some(previous) = previous else {
        if current.is_running() {
            return vec![Event::new(
                EventKind::Started,
                current,
                now,
                format!("Container {} started", current.name),
            )];
        }
        return Vec::new();
    };

    if previous.state == current.state {
        return Vec::new();
    }

    let event = match current.state.as_str() {
        STATE_RUNNING => {
            let was_stopped = previous.state == STATE_EXITED || previous.state == STATE_DEAD;
            // a clock jump backwards counts as "just now"
            let since_stop = now
                .duration_since(previous.last_seen)
                .unwrap_or(Duration::ZERO);
            if was_stopped && since_stop < RESTART_WINDOW {
                Event::new(
                    EventKind::Restarted,
                    current,
                    now,
                    format!(
                        "Container {} restarted after {:.1}s",
                        current.name,
                        since_stop.as_secs_f64()
                    ),
                )
                .with_data("previous_state", &previous.state)
                .with_data(
                    "time_since_stop",
                    format!("{:.1}s", since_stop.as_secs_f64()),
                )
            } else {
                Event::new(
                    EventKind::Started,
                    current,
                    now,
                    format!(
                        "Container {} started (was {})",
                        current.name, previous.state
                    ),
                )
                .with_data("previous_state", &previous.state)
            }
        }
        STATE_EXITED => Event::new(
            EventKind::Stopped,
            current,
            now,
            format!("Container {} stopped", current.name),
        )
        .with_data("previous_state", &previous.state),
        STATE_DEAD => Event::new(
            EventKind::Died,
            current,
            now,
            format!("Container {} died", current.name),
        )
        .with_data("previous_state", &previous.state),
        _ => return Vec::new(),
    };

    vec![event]
}
