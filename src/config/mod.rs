//! Daemon configuration.
//!
//! The configuration is read from a JSON file whose path is taken from
//! `DOCKSPHINX_CONFIG`. Missing fields fall back to their defaults and
//! `DOCKSPHINX_SOCKET` overrides the RPC socket path. Every loaded configuration
//! is validated before it is handed to the engine.
mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub use error::{Error, Result};

use crate::docker::ContainerFilter;

pub const CONFIG_PATH_ENV: &str = "DOCKSPHINX_CONFIG";
pub const SOCKET_PATH_ENV: &str = "DOCKSPHINX_SOCKET";
pub const DEFAULT_SOCKET_PATH: &str = "/run/docksphinx/docksphinx.sock";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub thresholds: ThresholdConfig,
    pub filters: ContainerFilter,
    pub daemon: DaemonConfig,
}

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    /// Upper bound for one poll tick, independent of shutdown.
    pub tick_timeout_secs: u64,
    pub event_queue_capacity: usize,
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            tick_timeout_secs: 30,
            event_queue_capacity: 256,
        }
    }
}

/// Warning/critical cutoffs for one metric, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MetricThreshold {
    pub warning: f64,
    pub critical: f64,
    /// Number of back-to-back violating samples before an event fires.
    pub consecutive_count: u32,
}

impl MetricThreshold {
    fn validate(&self, metric: &'static str) -> Result<()> {
        if !self.warning.is_finite()
            || !self.critical.is_finite()
            || self.warning < 0.0
            || self.critical < 0.0
        {
            return Err(Error::ThresholdRange { metric });
        }
        if self.warning >= self.critical {
            return Err(Error::ThresholdOrder {
                metric,
                warning: self.warning,
                critical: self.critical,
            });
        }
        if self.consecutive_count == 0 {
            return Err(Error::ConsecutiveCount { metric });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub cpu: MetricThreshold,
    pub memory: MetricThreshold,
    /// Minimum time between two events for the same container and metric.
    pub cooldown_seconds: u64,
}

impl ThresholdConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu: MetricThreshold {
                warning: 70.0,
                critical: 90.0,
                consecutive_count: 3,
            },
            memory: MetricThreshold {
                warning: 80.0,
                critical: 95.0,
                consecutive_count: 3,
            },
            cooldown_seconds: 300,
        }
    }
}

/// Settings of the RPC-facing part of the daemon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    /// Capacity of each stream consumer's queue.
    pub subscriber_queue_capacity: usize,
    /// Number of recent events kept for snapshots.
    pub history_capacity: usize,
    /// Recent events included in a snapshot when the client does not ask for a count.
    pub recent_event_limit: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            subscriber_queue_capacity: 256,
            history_capacity: 1000,
            recent_event_limit: 50,
        }
    }
}

impl Config {
    /// Reads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] or [`Error::Parse`] if the file cannot be loaded and
    /// a validation error if the values are inconsistent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from the environment.
    ///
    /// Uses the file named by `DOCKSPHINX_CONFIG` if set, the defaults otherwise.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => {
                log::debug!("Loading config from {}", Path::new(&path).display());
                Self::load(path)?
            }
            None => Self::default(),
        };
        if let Some(socket) = std::env::var_os(SOCKET_PATH_ENV) {
            config.daemon.socket_path = PathBuf::from(socket);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.cpu.validate("cpu")?;
        self.thresholds.memory.validate("memory")?;
        if self.engine.poll_interval_secs == 0 {
            return Err(Error::Zero("engine.poll_interval_secs"));
        }
        if self.engine.tick_timeout_secs == 0 {
            return Err(Error::Zero("engine.tick_timeout_secs"));
        }
        if self.engine.event_queue_capacity == 0 {
            return Err(Error::Zero("engine.event_queue_capacity"));
        }
        if self.daemon.subscriber_queue_capacity == 0 {
            return Err(Error::Zero("daemon.subscriber_queue_capacity"));
        }
        if self.daemon.history_capacity == 0 {
            return Err(Error::Zero("daemon.history_capacity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "engine": {{ "poll_interval_secs": 2 }},
                "thresholds": {{
                    "cpu": {{ "warning": 50, "critical": 75, "consecutive_count": 2 }},
                    "cooldown_seconds": 30
                }},
                "filters": {{ "names": ["web"] }}
            }}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.engine.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.engine.tick_timeout(), Duration::from_secs(30));
        assert_eq!(config.thresholds.cpu.critical, 75.0);
        assert_eq!(config.thresholds.memory, ThresholdConfig::default().memory);
        assert_eq!(config.thresholds.cooldown(), Duration::from_secs(30));
        assert_eq!(config.filters.names, vec!["web".to_owned()]);
        assert!(config.filters.images.is_empty());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.thresholds.memory.warning = 96.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::ThresholdOrder {
                metric: "memory",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_consecutive_count() {
        let mut config = Config::default();
        config.thresholds.cpu.consecutive_count = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::ConsecutiveCount { metric: "cpu" }
        ));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = Config::default();
        config.engine.poll_interval_secs = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::Zero("engine.poll_interval_secs")
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/definitely/does/not/exist.json").unwrap_err();
        match err {
            Error::Read { path, source } => {
                assert_eq!(path, PathBuf::from("/definitely/does/not/exist.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected Read error, got {other:?}"),
        }
    }
}
