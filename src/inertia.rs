use cgmath::{Matrix3, Vector3};

use crate::error::ShapeError;

const AXES: [char; 3] = ['x', 'y', 'z'];

/// Size and density of the simulated body.
///
/// The body is a uniform box whose edges are `size * proportions`; the
/// default proportions `[1, 1, 1]` give a cube of edge `size`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeParameters {
    size: f64,
    density: f64,
    proportions: [f64; 3],
}

impl ShapeParameters {
    pub fn cube(size: f64, density: f64) -> Result<ShapeParameters, ShapeError> {
        ShapeParameters::cuboid(size, density, [1.0; 3])
    }

    pub fn cuboid(
        size: f64,
        density: f64,
        proportions: [f64; 3],
    ) -> Result<ShapeParameters, ShapeError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(ShapeError::NonPositiveSize(size));
        }
        if !(density.is_finite() && density > 0.0) {
            return Err(ShapeError::NonPositiveDensity(density));
        }
        for (axis, value) in AXES.into_iter().zip(proportions) {
            if !(value.is_finite() && value > 0.0) {
                return Err(ShapeError::NonPositiveProportion { axis, value });
            }
        }
        Ok(ShapeParameters {
            size,
            density,
            proportions,
        })
    }

    /// Edge lengths along the body x, y and z axes.
    pub fn edges(&self) -> Vector3<f64> {
        let [px, py, pz] = self.proportions;
        Vector3::new(self.size * px, self.size * py, self.size * pz)
    }

    pub fn mass(&self) -> f64 {
        let edges = self.edges();
        self.density * edges.x * edges.y * edges.z
    }
}

/// Body-frame inertia tensor of a body aligned with its principal axes.
///
/// Only the diagonal is stored; every moment is strictly positive, so the
/// tensor is always invertible.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InertiaTensor {
    principal: Vector3<f64>,
}

impl InertiaTensor {
    pub fn from_principal_moments(ix: f64, iy: f64, iz: f64) -> Result<InertiaTensor, ShapeError> {
        for (axis, value) in AXES.into_iter().zip([ix, iy, iz]) {
            if !(value.is_finite() && value > 0.0) {
                return Err(ShapeError::NonPositiveMoment { axis, value });
            }
        }
        Ok(InertiaTensor {
            principal: Vector3::new(ix, iy, iz),
        })
    }

    pub fn principal_moments(&self) -> Vector3<f64> {
        self.principal
    }

    /// The full 3x3 tensor. Off-diagonal entries are zero.
    pub fn matrix(&self) -> Matrix3<f64> {
        let Vector3 { x, y, z } = self.principal;
        #[rustfmt::skip]
        let m = Matrix3::new(
            x, 0.0, 0.0,
            0.0, y, 0.0,
            0.0, 0.0, z,
        );
        m
    }

    /// `ω = I⁻¹ L`, both in the body frame.
    pub fn angular_velocity(&self, momentum: Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            momentum.x / self.principal.x,
            momentum.y / self.principal.y,
            momentum.z / self.principal.z,
        )
    }

    /// `L = I ω`, both in the body frame.
    pub fn angular_momentum(&self, angular_velocity: Vector3<f64>) -> Vector3<f64> {
        self.matrix() * angular_velocity
    }
}

/// Computes the principal moments of a uniform solid box about its centroid.
///
/// For edges `a`, `b`, `c` and mass `m`, `I_x = m (b² + c²) / 12` and so on;
/// a cube of edge `a` gets `m a² / 6` on every axis.
pub fn compute_inertia_tensor(shape: &ShapeParameters) -> Result<InertiaTensor, ShapeError> {
    let m = shape.mass();
    let edges = shape.edges();
    let x2 = edges.x * edges.x;
    let y2 = edges.y * edges.y;
    let z2 = edges.z * edges.z;

    InertiaTensor::from_principal_moments(
        m * (y2 + z2) / 12.0,
        m * (x2 + z2) / 12.0,
        m * (x2 + y2) / 12.0,
    )
}
