//! Torque-free tumbling of a single rigid box.
//!
//! [`SimulationEngine`] advances the body on its own thread at a fixed time
//! step and hands out [`SimulationSnapshot`] copies to whoever draws it.

pub mod config;
pub mod engine;
pub mod error;
pub mod inertia;
pub mod integrator;
pub mod rigid_body;
pub mod snapshot;

pub use config::SimulationConfig;
pub use engine::{EngineState, Reset, SimulationEngine};
pub use error::{ConfigError, ConfigFileError, EngineError, NumericalInstabilityError, ShapeError};
pub use inertia::{compute_inertia_tensor, InertiaTensor, ShapeParameters};
pub use integrator::Method;
pub use rigid_body::RigidBodyState;
pub use snapshot::SimulationSnapshot;
