use std::path::PathBuf;

/// Errors that may occur while loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{metric} warning threshold {warning} must be below critical threshold {critical}")]
    ThresholdOrder {
        metric: &'static str,
        warning: f64,
        critical: f64,
    },
    #[error("{metric} thresholds must be finite and non-negative")]
    ThresholdRange { metric: &'static str },
    #[error("{metric} consecutive count must be at least 1")]
    ConsecutiveCount { metric: &'static str },
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
