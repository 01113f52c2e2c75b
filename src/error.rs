use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Rejected shape parameters. No inertia tensor is produced.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ShapeError {
    #[error("cube size must be positive and finite, got {0}")]
    NonPositiveSize(f64),

    #[error("cube density must be positive and finite, got {0}")]
    NonPositiveDensity(f64),

    #[error("proportion along the {axis} axis must be positive and finite, got {value}")]
    NonPositiveProportion { axis: char, value: f64 },

    #[error("principal moment about the {axis} axis must be positive and finite, got {value}")]
    NonPositiveMoment { axis: char, value: f64 },
}

/// Rejected simulation configuration. The engine keeps its prior configuration.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("time step must be greater than zero, got {0} s")]
    NonPositiveTimestep(f64),

    #[error("seed angular velocity about the {axis} axis must be finite, got {value}")]
    NonFiniteSeed { axis: char, value: f64 },
}

/// A step produced a non-finite orientation or angular momentum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("integration produced a non-finite state at step {step}")]
pub struct NumericalInstabilityError {
    pub step: u64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("simulation engine is not running")]
    NotRunning,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn the simulation thread")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}
