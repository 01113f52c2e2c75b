//! Torque-free rigid body integration.
//!
//! Euler's equations in the body frame with zero external torque reduce to
//!
//! ```text
//! dL/dt = -ω × L        ω = I⁻¹ L
//! dq/dt = ½ q ⊗ (0, ω)
//! ```
//!
//! Angular momentum and orientation are advanced together as one system.
//! The orientation is renormalized after every step.

use cgmath::InnerSpace;
use cgmath::Quaternion;
use cgmath::Vector3;
use serde::{Deserialize, Serialize};

use crate::inertia::InertiaTensor;
use crate::rigid_body::RigidBodyState;

/// Scheme used to advance the state by one step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Classic fixed-step 4th-order Runge–Kutta on `(L, q)`.
    #[default]
    Rk4,

    /// First-order step: momentum first, then orientation with the updated ω.
    ///
    /// Cheaper than RK4 but `‖L‖` grows every step, which shows up as a
    /// visible energy gain at `dt = 0.001` within seconds.
    SemiImplicitEuler,
}

impl Method {
    pub fn step(self, state: &RigidBodyState, tensor: &InertiaTensor, dt: f64) -> RigidBodyState {
        step(state, tensor, dt, self)
    }
}

/// Advances `state` by `dt` seconds.
///
/// The returned state may contain non-finite values if the step blew up;
/// callers check [`RigidBodyState::is_finite`] before publishing it.
pub fn step(
    state: &RigidBodyState,
    tensor: &InertiaTensor,
    dt: f64,
    method: Method,
) -> RigidBodyState {
    let y = Phase {
        momentum: state.angular_momentum,
        orientation: state.orientation,
    };

    let next = match method {
        Method::Rk4 => rk4(&y, tensor, dt),
        Method::SemiImplicitEuler => semi_implicit_euler(&y, tensor, dt),
    };

    RigidBodyState {
        orientation: next.orientation.normalize(),
        angular_momentum: next.momentum,
        angular_velocity: tensor.angular_velocity(next.momentum),
    }
}

/// The integrated variables, also used for their time derivatives.
#[derive(Copy, Clone, Debug)]
struct Phase {
    momentum: Vector3<f64>,
    orientation: Quaternion<f64>,
}

impl Phase {
    fn rate(&self, tensor: &InertiaTensor) -> Phase {
        let omega = tensor.angular_velocity(self.momentum);
        Phase {
            momentum: self.momentum.cross(omega),
            orientation: quaternion_rate(self.orientation, omega),
        }
    }

    fn advanced(&self, rate: &Phase, h: f64) -> Phase {
        Phase {
            momentum: self.momentum + rate.momentum * h,
            orientation: self.orientation + rate.orientation * h,
        }
    }
}

/// `½ q ⊗ (0, ω)` with ω in the body frame.
fn quaternion_rate(q: Quaternion<f64>, omega: Vector3<f64>) -> Quaternion<f64> {
    q * Quaternion::from_sv(0.0, omega) * 0.5
}

fn rk4(y: &Phase, tensor: &InertiaTensor, h: f64) -> Phase {
    let k1 = y.rate(tensor);
    let k2 = y.advanced(&k1, 0.5 * h).rate(tensor);
    let k3 = y.advanced(&k2, 0.5 * h).rate(tensor);
    let k4 = y.advanced(&k3, h).rate(tensor);

    let weighted = Phase {
        momentum: k1.momentum + k2.momentum * 2.0 + k3.momentum * 2.0 + k4.momentum,
        orientation: k1.orientation + k2.orientation * 2.0 + k3.orientation * 2.0 + k4.orientation,
    };
    y.advanced(&weighted, h / 6.0)
}

fn semi_implicit_euler(y: &Phase, tensor: &InertiaTensor, h: f64) -> Phase {
    let omega = tensor.angular_velocity(y.momentum);
    let momentum = y.momentum + y.momentum.cross(omega) * h;

    let omega = tensor.angular_velocity(momentum);
    let orientation = y.orientation + quaternion_rate(y.orientation, omega) * h;

    Phase {
        momentum,
        orientation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use crate::inertia::{compute_inertia_tensor, ShapeParameters};

    const DT: f64 = 0.001;

    /// Brick with edges 1:2:3, principal moments (6.5, 5.0, 2.5).
    /// The y axis is the intermediate one.
    fn brick() -> InertiaTensor {
        let shape = ShapeParameters::cuboid(1.0, 1.0, [1.0, 2.0, 3.0]).unwrap();
        compute_inertia_tensor(&shape).unwrap()
    }

    fn spinning(omega: Vector3<f64>, tensor: &InertiaTensor) -> RigidBodyState {
        RigidBodyState::new(
            Quaternion::new(1.0, 0.0, 0.0, 0.0),
            tensor.angular_momentum(omega),
            tensor,
        )
    }

    /// Runs `steps` steps and returns every intermediate state.
    fn trajectory(
        initial: RigidBodyState,
        tensor: &InertiaTensor,
        method: Method,
        steps: usize,
    ) -> Vec<RigidBodyState> {
        std::iter::successors(Some(initial), |s| Some(step(s, tensor, DT, method)))
            .take(steps + 1)
            .collect()
    }

    #[test]
    fn momentum_magnitude_is_conserved() {
        let tensor = brick();
        let initial = spinning(Vector3::new(1.0, 3.0, -2.0), &tensor);
        let l0 = initial.angular_momentum.magnitude();
        let world_l0 = initial.world_angular_momentum();

        for state in trajectory(initial, &tensor, Method::Rk4, 10_000) {
            assert_relative_eq!(
                state.angular_momentum.magnitude(),
                l0,
                max_relative = 1e-6
            );
            let world = state.world_angular_momentum();
            assert_abs_diff_eq!(world.x, world_l0.x, epsilon = 1e-4 * l0);
            assert_abs_diff_eq!(world.y, world_l0.y, epsilon = 1e-4 * l0);
            assert_abs_diff_eq!(world.z, world_l0.z, epsilon = 1e-4 * l0);
        }
    }

    #[test]
    fn kinetic_energy_is_conserved() {
        let tensor = brick();
        let initial = spinning(Vector3::new(0.2, 4.0, 0.5), &tensor);
        let e0 = initial.kinetic_energy();

        let last = trajectory(initial, &tensor, Method::Rk4, 10_000)
            .pop()
            .unwrap();
        assert_relative_eq!(last.kinetic_energy(), e0, max_relative = 1e-6);
    }

    #[test]
    fn orientation_stays_unit_length() {
        let tensor = brick();
        for method in [Method::Rk4, Method::SemiImplicitEuler] {
            let initial = spinning(Vector3::new(3.0, -7.0, 11.0), &tensor);
            for state in trajectory(initial, &tensor, method, 5_000) {
                assert!(state.has_unit_orientation(), "{method:?}: {state:?}");
            }
        }
    }

    #[test]
    fn returned_velocity_matches_momentum() {
        let tensor = brick();
        let initial = spinning(Vector3::new(1.0, 2.0, 3.0), &tensor);
        let next = step(&initial, &tensor, DT, Method::Rk4);

        assert_eq!(
            next.angular_velocity,
            tensor.angular_velocity(next.angular_momentum)
        );
    }

    #[test]
    fn symmetric_body_spins_steadily() {
        let shape = ShapeParameters::cube(2.0, 1.0).unwrap();
        let tensor = compute_inertia_tensor(&shape).unwrap();
        let omega = Vector3::new(0.3, -1.2, 0.7);
        let initial = spinning(omega, &tensor);

        let last = trajectory(initial, &tensor, Method::Rk4, 1_000)
            .pop()
            .unwrap();
        assert_relative_eq!(last.angular_velocity.x, omega.x, max_relative = 1e-12);
        assert_relative_eq!(last.angular_velocity.y, omega.y, max_relative = 1e-12);
        assert_relative_eq!(last.angular_velocity.z, omega.z, max_relative = 1e-12);
    }

    #[test]
    fn orientation_follows_constant_spin() {
        let tensor = InertiaTensor::from_principal_moments(1.0, 1.0, 1.0).unwrap();
        let initial = spinning(Vector3::new(0.0, 0.0, 1.0), &tensor);

        // One second at 1 rad/s about z is a rotation of 1 rad.
        let last = trajectory(initial, &tensor, Method::Rk4, 1_000)
            .pop()
            .unwrap();
        assert_abs_diff_eq!(last.orientation.s, 0.5_f64.cos(), epsilon = 1e-9);
        assert_abs_diff_eq!(last.orientation.v.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(last.orientation.v.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(last.orientation.v.z, 0.5_f64.sin(), epsilon = 1e-9);
    }

    #[test]
    fn pure_principal_spin_has_no_drift() {
        let tensor = brick();
        for omega in [Vector3::new(5.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 5.0)] {
            let initial = spinning(omega, &tensor);
            for state in trajectory(initial, &tensor, Method::Rk4, 10_000) {
                assert_eq!(state.angular_velocity, omega);
            }
        }
    }

    #[test]
    fn major_and_minor_axes_are_stable() {
        let tensor = brick();
        let cases = [
            // Major axis x, nudged along y.
            (Vector3::new(5.0, 0.01, 0.0), 0),
            // Minor axis z, nudged along y.
            (Vector3::new(0.0, 0.01, 5.0), 2),
        ];

        for (omega, axis) in cases {
            let initial = spinning(omega, &tensor);
            for state in trajectory(initial, &tensor, Method::Rk4, 10_000) {
                let w = state.angular_velocity;
                for off in (0..3).filter(|&i| i != axis) {
                    assert!(w[off].abs() < 0.05, "axis {axis} drifted: {w:?}");
                }
            }
        }
    }

    #[test]
    fn intermediate_axis_flips() {
        let tensor = brick();
        // Nominal spin about y with a small perturbation about x.
        let initial = spinning(Vector3::new(0.01, 5.0, 0.0), &tensor);
        let states = trajectory(initial, &tensor, Method::Rk4, 20_000);

        let first_excursion = states
            .iter()
            .position(|s| s.angular_velocity.x.abs().max(s.angular_velocity.z.abs()) > 1.0);
        assert!(
            first_excursion.is_some_and(|i| i <= 10_000),
            "no off-axis excursion within 10 000 steps"
        );

        // The spin about y reverses at least once.
        assert!(states.iter().any(|s| s.angular_velocity.y < -4.0));
    }

    #[test]
    fn rk4_drifts_less_than_semi_implicit_euler() {
        let tensor = brick();
        let initial = spinning(Vector3::new(0.5, 5.0, 0.5), &tensor);
        let l0 = initial.angular_momentum.magnitude();

        let drift = |method| {
            let last = trajectory(initial, &tensor, method, 5_000).pop().unwrap();
            (last.angular_momentum.magnitude() - l0).abs()
        };

        let rk4 = drift(Method::Rk4);
        let euler = drift(Method::SemiImplicitEuler);
        assert!(rk4 < euler, "rk4 {rk4} vs euler {euler}");
    }

    #[test]
    fn method_deserializes_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            method: Method,
        }

        let parsed: Wrapper = toml::from_str(r#"method = "semi_implicit_euler""#).unwrap();
        assert_eq!(parsed.method, Method::SemiImplicitEuler);
        assert_eq!(Method::default(), Method::Rk4);
    }
}
