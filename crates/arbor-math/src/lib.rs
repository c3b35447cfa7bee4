//! Lie-group transforms and spatial algebra for the arbor physics engine.
//!
//! Implements 6D spatial vectors, rigid transforms with their adjoint
//! operators `Ad`, `ad`, `dAd`, and the exponential/logarithm maps on
//! SO(3) and SE(3).
//!
//! Convention: spatial vectors are [angular; linear]. A spatial motion
//! vector (twist) is [ω; v], a spatial force vector (wrench) is [τ; f].

pub mod lie;
pub mod spatial;
pub mod transform;

pub use lie::{exp_map, exp_map_rot, log_map, log_map_rot, verify_rotation, verify_transform};
pub use spatial::{transform_inertia, SpatialInertia, SpatialVec};
pub use transform::Transform;

/// 3D vector alias.
pub type Vec3 = nalgebra::Vector3<f64>;
/// 6D vector alias.
pub type Vec6 = nalgebra::Vector6<f64>;
/// 3x3 matrix alias.
pub type Mat3 = nalgebra::Matrix3<f64>;
/// 6x6 matrix alias.
pub type Mat6 = nalgebra::Matrix6<f64>;
/// Dynamic vector.
pub type DVec = nalgebra::DVector<f64>;
/// Dynamic matrix.
pub type DMat = nalgebra::DMatrix<f64>;
/// Joint Jacobian block: 6 rows, one column per degree of freedom.
pub type Jacobian = nalgebra::Matrix6xX<f64>;

/// Cross-product matrix: [v]x such that [v]x w = v x w.
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Standard gravity (m/s^2).
pub const GRAVITY: f64 = 9.81;
