//! Exponential and logarithm maps on SO(3) and SE(3).

use crate::spatial::SpatialVec;
use crate::transform::Transform;
use crate::{skew, Mat3, Vec3};

/// Tolerance for transform validity checks.
pub const TRANSFORM_TOLERANCE: f64 = 1e-6;

const SMALL_ANGLE: f64 = 1e-10;

/// Rodrigues' formula: rotation matrix for the axis-angle vector `w`.
pub fn exp_map_rot(w: &Vec3) -> Mat3 {
    let theta = w.norm();
    let wx = skew(w);
    if theta < SMALL_ANGLE {
        // Second-order series, accurate to O(theta^4).
        Mat3::identity() + wx + wx * wx * 0.5
    } else {
        let s = theta.sin() / theta;
        let c = (1.0 - theta.cos()) / (theta * theta);
        Mat3::identity() + wx * s + wx * wx * c
    }
}

/// Exponential map on SE(3) for the twist `xi = [w; v]`.
pub fn exp_map(xi: &SpatialVec) -> Transform {
    let w = xi.angular();
    let v = xi.linear();
    let theta = w.norm();
    let wx = skew(&w);

    let rot = exp_map_rot(&w);
    let pos = if theta < SMALL_ANGLE {
        (Mat3::identity() + wx * 0.5 + wx * wx * (1.0 / 6.0)) * v
    } else {
        let t2 = theta * theta;
        let a = (1.0 - theta.cos()) / t2;
        let b = (theta - theta.sin()) / (t2 * theta);
        (Mat3::identity() + wx * a + wx * wx * b) * v
    };
    Transform::new(rot, pos)
}

/// Logarithm map on SO(3): the principal-branch axis-angle vector of `r`.
///
/// Near the identity (trace close to 3) the skew part is read off directly;
/// near a half turn (trace close to -1) the axis is extracted from the
/// diagonal since the skew part vanishes.
pub fn log_map_rot(r: &Mat3) -> Vec3 {
    let trace = r[(0, 0)] + r[(1, 1)] + r[(2, 2)];
    let cos_theta = ((trace - 1.0) * 0.5).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();

    if theta < SMALL_ANGLE {
        // R ≈ I + [w]x; read the skew part.
        return Vec3::new(
            (r[(2, 1)] - r[(1, 2)]) * 0.5,
            (r[(0, 2)] - r[(2, 0)]) * 0.5,
            (r[(1, 0)] - r[(0, 1)]) * 0.5,
        );
    }

    if (std::f64::consts::PI - theta).abs() < 1e-6 {
        // Half turn: sin(theta) ~ 0, extract the axis from R = 2 a aᵀ - I.
        let xx = (r[(0, 0)] + 1.0) * 0.5;
        let yy = (r[(1, 1)] + 1.0) * 0.5;
        let zz = (r[(2, 2)] + 1.0) * 0.5;
        let axis = if xx >= yy && xx >= zz {
            let x = xx.max(0.0).sqrt();
            Vec3::new(x, (r[(0, 1)] + r[(1, 0)]) * 0.25 / x, (r[(0, 2)] + r[(2, 0)]) * 0.25 / x)
        } else if yy >= zz {
            let y = yy.max(0.0).sqrt();
            Vec3::new((r[(0, 1)] + r[(1, 0)]) * 0.25 / y, y, (r[(1, 2)] + r[(2, 1)]) * 0.25 / y)
        } else {
            let z = zz.max(0.0).sqrt();
            Vec3::new((r[(0, 2)] + r[(2, 0)]) * 0.25 / z, (r[(1, 2)] + r[(2, 1)]) * 0.25 / z, z)
        };
        // Orient so that the skew part, however small, agrees in sign.
        let sign = Vec3::new(
            r[(2, 1)] - r[(1, 2)],
            r[(0, 2)] - r[(2, 0)],
            r[(1, 0)] - r[(0, 1)],
        );
        let axis = if axis.dot(&sign) < 0.0 { -axis } else { axis };
        return axis.normalize() * theta;
    }

    let factor = theta / (2.0 * theta.sin());
    Vec3::new(
        (r[(2, 1)] - r[(1, 2)]) * factor,
        (r[(0, 2)] - r[(2, 0)]) * factor,
        (r[(1, 0)] - r[(0, 1)]) * factor,
    )
}

/// Logarithm map on SE(3): the twist `[w; v]` with `exp_map([w; v]) = t`.
pub fn log_map(t: &Transform) -> SpatialVec {
    let w = log_map_rot(&t.rot);
    let theta = w.norm();
    let wx = skew(&w);

    let v = if theta < SMALL_ANGLE {
        (Mat3::identity() - wx * 0.5 + wx * wx * (1.0 / 12.0)) * t.pos
    } else {
        let half = theta * 0.5;
        let cot_term = (1.0 - half * half.cos() / half.sin()) / (theta * theta);
        (Mat3::identity() - wx * 0.5 + wx * wx * cot_term) * t.pos
    };
    SpatialVec::new(w, v)
}

/// True when `r` is a proper rotation: finite, orthonormal to
/// [`TRANSFORM_TOLERANCE`], determinant +1.
pub fn verify_rotation(r: &Mat3) -> bool {
    if !r.iter().all(|x| x.is_finite()) {
        return false;
    }
    let rrt = r * r.transpose();
    let mut max_err: f64 = 0.0;
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            max_err = max_err.max((rrt[(i, j)] - expected).abs());
        }
    }
    max_err < TRANSFORM_TOLERANCE && (r.determinant() - 1.0).abs() < TRANSFORM_TOLERANCE
}

/// True when `t` is a valid rigid transform: finite translation and a
/// proper rotation part.
pub fn verify_transform(t: &Transform) -> bool {
    t.pos.iter().all(|x| x.is_finite()) && verify_rotation(&t.rot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exp_rot_about_z() {
        let r = exp_map_rot(&Vec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        let x = r * Vec3::x();
        assert_relative_eq!(x, Vec3::y(), epsilon = 1e-12);
    }

    #[test]
    fn log_of_half_turn() {
        let w = Vec3::new(0.0, std::f64::consts::PI, 0.0);
        let r = exp_map_rot(&w);
        let back = log_map_rot(&r);
        assert_relative_eq!(back.norm(), std::f64::consts::PI, epsilon = 1e-9);
        assert_relative_eq!(back.y.abs(), std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn se3_round_trip() {
        let xi = SpatialVec::new(Vec3::new(0.4, -0.2, 0.7), Vec3::new(1.0, 2.0, -0.5));
        let t = exp_map(&xi);
        let back = log_map(&t);
        assert_relative_eq!(back.data, xi.data, epsilon = 1e-10);
    }

    #[test]
    fn exp_rot_is_valid_rotation() {
        let r = exp_map_rot(&Vec3::new(0.9, -1.4, 0.3));
        assert!(verify_rotation(&r));
        assert!(verify_transform(&Transform::from_rotation(r)));
    }

    #[test]
    fn rejects_nan_and_scaled() {
        let mut r = Mat3::identity();
        assert!(verify_rotation(&r));
        r[(0, 0)] = f64::NAN;
        assert!(!verify_rotation(&r));
        assert!(!verify_rotation(&(Mat3::identity() * 2.0)));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn arb_axis_angle() -> impl Strategy<Value = Vec3> {
        // Magnitude stays below pi (principal branch).
        (-1.0..1.0_f64, -1.0..1.0_f64, -1.0..1.0_f64)
            .prop_filter("non-zero", |(x, y, z)| x * x + y * y + z * z > 1e-6)
            .prop_map(|(x, y, z)| Vec3::new(x, y, z) * 1.7)
    }

    fn arb_pos() -> impl Strategy<Value = Vec3> {
        (-5.0..5.0_f64, -5.0..5.0_f64, -5.0..5.0_f64).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn rot_log_exp_round_trip(w in arb_axis_angle()) {
            let back = log_map_rot(&exp_map_rot(&w));
            prop_assert!((back - w).norm() < EPS, "w = {w:?}, back = {back:?}");
        }

        #[test]
        fn se3_log_exp_round_trip(w in arb_axis_angle(), v in arb_pos()) {
            let xi = SpatialVec::new(w, v);
            let back = log_map(&exp_map(&xi));
            prop_assert!((back.data - xi.data).norm() < 1e-8,
                "xi = {:?}, back = {:?}", xi.data, back.data);
        }

        #[test]
        fn ad_of_inverse_is_inverse_of_ad(w in arb_axis_angle(), p in arb_pos()) {
            let t = Transform::new(exp_map_rot(&w), p);
            let prod = t.inverse().ad_matrix() * t.ad_matrix();
            let id = crate::Mat6::identity();
            for i in 0..6 {
                for j in 0..6 {
                    prop_assert!((prod[(i, j)] - id[(i, j)]).abs() < EPS,
                        "entry ({i},{j}) = {}", prod[(i, j)]);
                }
            }
        }

        #[test]
        fn exp_produces_valid_transform(w in arb_axis_angle(), v in arb_pos()) {
            let t = exp_map(&SpatialVec::new(w, v));
            prop_assert!(verify_transform(&t));
        }
    }
}
