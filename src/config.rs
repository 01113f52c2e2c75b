use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigFileError};
use crate::inertia::{compute_inertia_tensor, InertiaTensor, ShapeParameters};
use crate::integrator::Method;

/// User-adjustable simulation parameters.
///
/// Missing fields take their [`Default`] values when deserialized, so a
/// configuration file only needs the entries it changes:
///
/// ```toml
/// cube_size = 2.0
/// proportions = [1.0, 2.0, 3.0]
/// seed_angular_velocity_x = 0.01
/// seed_angular_velocity_y = 5.0
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Fixed physical time step in seconds.
    pub dt: f64,
    pub cube_size: f64,
    pub cube_density: f64,
    /// Edge multipliers along the body x, y and z axes.
    pub proportions: [f64; 3],
    /// Initial spin about the body x axis in rad/s.
    pub seed_angular_velocity_x: f64,
    /// Initial spin about the body y axis in rad/s.
    pub seed_angular_velocity_y: f64,
    pub paused: bool,
    pub method: Method,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            cube_size: 5.0,
            cube_density: 1.0,
            proportions: [1.0; 3],
            seed_angular_velocity_x: 0.0,
            seed_angular_velocity_y: 0.0,
            paused: false,
            method: Method::Rk4,
        }
    }
}

impl SimulationConfig {
    pub fn shape(&self) -> Result<ShapeParameters, ConfigError> {
        Ok(ShapeParameters::cuboid(
            self.cube_size,
            self.cube_density,
            self.proportions,
        )?)
    }

    /// Checks every field and derives the inertia tensor.
    pub fn validate(&self) -> Result<InertiaTensor, ConfigError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::NonPositiveTimestep(self.dt));
        }
        for (axis, value) in [
            ('x', self.seed_angular_velocity_x),
            ('y', self.seed_angular_velocity_y),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteSeed { axis, value });
            }
        }
        Ok(compute_inertia_tensor(&self.shape()?)?)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigFileError> {
        let config: SimulationConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Whether switching to `other` changes the inertia tensor.
    pub fn shape_differs(&self, other: &SimulationConfig) -> bool {
        self.cube_size != other.cube_size
            || self.cube_density != other.cube_density
            || self.proportions != other.proportions
    }
}
