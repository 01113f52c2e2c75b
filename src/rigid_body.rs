use cgmath::InnerSpace;
use cgmath::Quaternion;
use cgmath::Vector3;

use crate::inertia::InertiaTensor;

/// Tolerance on `|‖q‖ - 1|` for an orientation to count as a rotation.
pub const ORIENTATION_TOLERANCE: f64 = 1e-9;

/// Rotational state of the free body.
///
/// Angular momentum is the integrated quantity; angular velocity is kept
/// consistent with it through the inertia tensor. Both are expressed in the
/// body frame. The orientation maps body coordinates to world coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RigidBodyState {
    pub orientation: Quaternion<f64>,
    pub angular_momentum: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

impl RigidBodyState {
    pub fn new(
        orientation: Quaternion<f64>,
        angular_momentum: Vector3<f64>,
        tensor: &InertiaTensor,
    ) -> RigidBodyState {
        RigidBodyState {
            orientation: orientation.normalize(),
            angular_momentum,
            angular_velocity: tensor.angular_velocity(angular_momentum),
        }
    }

    /// Identity orientation spinning at `(seed_x, seed_y, 0)` rad/s.
    pub fn from_seed(seed_x: f64, seed_y: f64, tensor: &InertiaTensor) -> RigidBodyState {
        let seed = Vector3::new(seed_x, seed_y, 0.0);
        RigidBodyState::new(
            Quaternion::new(1.0, 0.0, 0.0, 0.0),
            tensor.angular_momentum(seed),
            tensor,
        )
    }

    /// Keeps orientation and momentum, re-deriving ω under a new tensor.
    pub fn with_tensor(self, tensor: &InertiaTensor) -> RigidBodyState {
        RigidBodyState::new(self.orientation, self.angular_momentum, tensor)
    }

    /// Rotational kinetic energy `½ L·ω`.
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.angular_momentum.dot(self.angular_velocity)
    }

    /// Angular momentum rotated into the world frame. Constant in torque-free motion.
    pub fn world_angular_momentum(&self) -> Vector3<f64> {
        self.orientation * self.angular_momentum
    }

    pub fn is_finite(&self) -> bool {
        let q = self.orientation;
        let l = self.angular_momentum;
        let w = self.angular_velocity;
        [q.s, q.v.x, q.v.y, q.v.z, l.x, l.y, l.z, w.x, w.y, w.z]
            .into_iter()
            .all(f64::is_finite)
    }

    pub fn has_unit_orientation(&self) -> bool {
        (self.orientation.magnitude() - 1.0).abs() <= ORIENTATION_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn tensor() -> InertiaTensor {
        InertiaTensor::from_principal_moments(2.0, 3.0, 4.0).unwrap()
    }

    #[test]
    fn seed_state_is_consistent() {
        let state = RigidBodyState::from_seed(1.5, -2.0, &tensor());

        assert_eq!(state.orientation, Quaternion::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(state.angular_velocity, Vector3::new(1.5, -2.0, 0.0));
        assert_eq!(state.angular_momentum, Vector3::new(3.0, -6.0, 0.0));
        assert!(state.has_unit_orientation());
    }

    #[test]
    fn kinetic_energy_is_half_l_dot_omega() {
        let state = RigidBodyState::from_seed(1.0, 2.0, &tensor());
        // ½ (2·1² + 3·2²)
        assert_relative_eq!(state.kinetic_energy(), 7.0);
    }

    #[test]
    fn new_normalizes_orientation() {
        let state = RigidBodyState::new(
            Quaternion::new(2.0, 0.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            &tensor(),
        );
        assert!(state.has_unit_orientation());
        assert_eq!(state.angular_velocity, Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn with_tensor_keeps_momentum() {
        let state = RigidBodyState::from_seed(1.0, 1.0, &tensor());
        let other = InertiaTensor::from_principal_moments(1.0, 1.0, 1.0).unwrap();
        let rescaled = state.with_tensor(&other);

        assert_eq!(rescaled.angular_momentum, state.angular_momentum);
        assert_eq!(rescaled.angular_velocity, Vector3::new(2.0, 3.0, 0.0));
    }

    #[test]
    fn world_momentum_rotates_with_orientation() {
        // Quarter turn about z maps body x onto world y.
        let half = std::f64::consts::FRAC_PI_4;
        let state = RigidBodyState::new(
            Quaternion::new(half.cos(), 0.0, 0.0, half.sin()),
            Vector3::new(1.0, 0.0, 0.0),
            &tensor(),
        );
        let world = state.world_angular_momentum();
        assert_relative_eq!(world.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(world.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(world.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn detects_non_finite_values() {
        let mut state = RigidBodyState::from_seed(1.0, 0.0, &tensor());
        assert!(state.is_finite());
        state.angular_velocity.z = f64::NAN;
        assert!(!state.is_finite());
    }
}
