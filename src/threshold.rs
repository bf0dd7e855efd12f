//! Hysteresis-based threshold evaluation for CPU and memory usage.
//!
//! [`ThresholdMonitor`] only holds its configuration. The consecutive-violation
//! counters and the last-fired timestamps live on the [`ContainerState`] passed to
//! [`ThresholdMonitor::check`], so the monitor can be shared freely and the state
//! disappears together with the container record.
//!
//! Per metric and sample:
//!
//! 1. The value is classified as `critical` (`>= critical`), `warning` (`>= warning`)
//!    or below both.
//! 2. Below both, the counter resets and nothing fires.
//! 3. Otherwise the counter increments. Once it reaches the configured count, the
//!    run is consumed (counter back to zero) and an event fires unless the metric
//!    already fired within the cooldown window.
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::config::{MetricThreshold, ThresholdConfig};
use crate::container::ContainerState;
use crate::event::{Event, EventKind};

/// Classification of a sample relative to the configured cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    None,
    Warning,
    Critical,
}

impl Level {
    pub fn classify(value: f64, threshold: &MetricThreshold) -> Self {
        if value >= threshold.critical {
            Level::Critical
        } else if value >= threshold.warning {
            Level::Warning
        } else {
            Level::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::None => "none",
            Level::Warning => "warning",
            Level::Critical => "critical",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Metric {
    Cpu,
    Memory,
}

impl Metric {
    fn kind(self) -> EventKind {
        match self {
            Metric::Cpu => EventKind::CpuThreshold,
            Metric::Memory => EventKind::MemoryThreshold,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Metric::Cpu => "CPU",
            Metric::Memory => "Memory",
        }
    }

    fn data_key(self) -> &'static str {
        match self {
            Metric::Cpu => "cpu_percent",
            Metric::Memory => "memory_percent",
        }
    }
}

/// A confirmed violation that passed the cooldown gate.
struct Breach {
    level: Level,
    threshold: f64,
    consecutive: u32,
}

#[derive(Debug, Clone)]
pub struct ThresholdMonitor {
    config: ThresholdConfig,
}

impl ThresholdMonitor {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    /// Evaluates the current sample of `state` and updates its hysteresis fields.
    ///
    /// CPU and memory are evaluated independently, so both may fire in one call.
    pub fn check(&self, state: &mut ContainerState, now: SystemTime) -> Vec<Event> {
        let cooldown = self.config.cooldown();
        let mut events = Vec::new();

        let cpu = state.cpu_percent;
        if let Some(breach) = evaluate(
            cpu,
            &self.config.cpu,
            cooldown,
            &mut state.cpu_consecutive_count,
            &mut state.last_cpu_alert,
            now,
        ) {
            events.push(threshold_event(Metric::Cpu, cpu, breach, state, now));
        }

        let memory = state.memory_percent;
        if let Some(breach) = evaluate(
            memory,
            &self.config.memory,
            cooldown,
            &mut state.memory_consecutive_count,
            &mut state.last_memory_alert,
            now,
        ) {
            events.push(threshold_event(Metric::Memory, memory, breach, state, now));
        }

        events
    }
}

fn evaluate(
    value: f64,
    threshold: &MetricThreshold,
    cooldown: Duration,
    counter: &mut u32,
    last_alert: &mut Option<SystemTime>,
    now: SystemTime,
) -> Option<Breach> {
    let level = Level::classify(value, threshold);
    if level == Level::None {
        *counter = 0;
        return None;
    }

    *counter = counter.saturating_add(1);
    if *counter < threshold.consecutive_count {
        return None;
    }

    // a confirmed run is consumed even when the cooldown suppresses the event
    let consecutive = std::mem::take(counter);

    let cooled_down = match *last_alert {
        None => true,
        Some(last) => now.duration_since(last).unwrap_or(Duration::ZERO) >= cooldown,
    };
    if !cooled_down {
        log::trace!("threshold event suppressed by cooldown: value={value:.2}, level={level}");
        return None;
    }

    *last_alert = Some(now);
    Some(Breach {
        level,
        threshold: match level {
            Level::Critical => threshold.critical,
            _ => threshold.warning,
        },
        consecutive,
    })
}

fn threshold_event(
    metric: Metric,
    value: f64,
    breach: Breach,
    state: &ContainerState,
    now: SystemTime,
) -> Event {
    Event::new(
        metric.kind(),
        state,
        now,
        format!(
            "{} usage of container {} is {:.2}% ({} threshold {:.2}%)",
            metric.label(),
            state.name,
            value,
            breach.level,
            breach.threshold
        ),
    )
    .with_data(metric.data_key(), format!("{value:.2}"))
    .with_data("threshold", format!("{:.2}", breach.threshold))
    .with_data("level", breach.level)
    .with_data("consecutive_count", breach.consecutive)
}
