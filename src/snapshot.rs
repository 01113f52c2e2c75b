use cgmath::{Euler, Quaternion, Rad, Vector3};

use crate::error::NumericalInstabilityError;
use crate::inertia::{InertiaTensor, ShapeParameters};
use crate::rigid_body::RigidBodyState;

/// Immutable copy of the simulation state at one step boundary.
///
/// This is all a renderer or GUI ever sees of the engine. It is `Copy`, so
/// taking one out of the engine never holds a lock longer than a memcpy.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimulationSnapshot {
    /// Number of steps taken since the last reset.
    pub step: u64,
    /// Simulated seconds since the last reset.
    pub time: f64,
    pub orientation: Quaternion<f64>,
    /// Body frame, rad/s.
    pub angular_velocity: Vector3<f64>,
    /// Body frame.
    pub angular_momentum: Vector3<f64>,
    pub world_angular_momentum: Vector3<f64>,
    pub kinetic_energy: f64,
    pub euler_angles: Euler<Rad<f64>>,
    pub principal_moments: Vector3<f64>,
    /// Edge lengths of the body along its x, y and z axes.
    pub edges: Vector3<f64>,
    pub paused: bool,
    /// Set when the last attempted step was rejected as non-finite.
    pub fault: Option<NumericalInstabilityError>,
}

impl SimulationSnapshot {
    /// Running, unfaulted view of `state`; the engine fills in the flags.
    pub(crate) fn capture(
        state: &RigidBodyState,
        tensor: &InertiaTensor,
        shape: &ShapeParameters,
        step: u64,
        time: f64,
    ) -> SimulationSnapshot {
        SimulationSnapshot {
            step,
            time,
            orientation: state.orientation,
            angular_velocity: state.angular_velocity,
            angular_momentum: state.angular_momentum,
            world_angular_momentum: state.world_angular_momentum(),
            kinetic_energy: state.kinetic_energy(),
            euler_angles: Euler::from(state.orientation),
            principal_moments: tensor.principal_moments(),
            edges: shape.edges(),
            paused: false,
            fault: None,
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::inertia::compute_inertia_tensor;

    #[test]
    fn capture_derives_display_quantities() {
        let shape = ShapeParameters::cuboid(1.0, 2.0, [1.0, 1.0, 2.0]).unwrap();
        let tensor = compute_inertia_tensor(&shape).unwrap();
        let state = RigidBodyState::from_seed(1.0, 0.0, &tensor);

        let snapshot = SimulationSnapshot::capture(&state, &tensor, &shape, 7, 0.007);

        assert_eq!(snapshot.step, 7);
        assert_eq!(snapshot.edges, Vector3::new(1.0, 1.0, 2.0));
        assert_eq!(snapshot.principal_moments, tensor.principal_moments());
        assert_eq!(snapshot.world_angular_momentum, state.angular_momentum);
        assert_relative_eq!(snapshot.kinetic_energy, 0.5 * tensor.principal_moments().x);
        assert_eq!(snapshot.euler_angles.x, Rad(0.0));
        assert!(!snapshot.is_faulted());
    }
}
