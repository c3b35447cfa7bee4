//! 6D spatial vectors and spatial inertia.
//!
//! Convention: spatial vectors are [angular; linear].

use crate::transform::Transform;
use crate::{skew, Mat3, Mat6, Vec3, Vec6};

/// 6D spatial vector — either a motion vector (twist) or force vector (wrench).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialVec {
    /// The underlying 6D vector [angular(3); linear(3)].
    pub data: Vec6,
}

impl SpatialVec {
    /// Create from angular and linear parts.
    #[inline]
    pub fn new(angular: Vec3, linear: Vec3) -> Self {
        Self {
            data: Vec6::new(
                angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
            ),
        }
    }

    /// Zero spatial vector.
    #[inline]
    pub fn zero() -> Self {
        Self {
            data: Vec6::zeros(),
        }
    }

    /// Wrap an existing 6D vector.
    #[inline]
    pub fn from_vec6(data: Vec6) -> Self {
        Self { data }
    }

    /// Angular (top 3) component.
    #[inline]
    pub fn angular(&self) -> Vec3 {
        Vec3::new(self.data[0], self.data[1], self.data[2])
    }

    /// Linear (bottom 3) component.
    #[inline]
    pub fn linear(&self) -> Vec3 {
        Vec3::new(self.data[3], self.data[4], self.data[5])
    }

    /// Spatial cross product for motion vectors: `ad(self) w = self ×ₘ w`.
    ///
    /// Used in velocity propagation and the Coriolis terms.
    pub fn cross_motion(&self, other: &SpatialVec) -> SpatialVec {
        let w = self.angular();
        let v = self.linear();
        let w2 = other.angular();
        let v2 = other.linear();
        SpatialVec::new(w.cross(&w2), w.cross(&v2) + v.cross(&w2))
    }

    /// Spatial cross product for force vectors: `self ×f f`.
    ///
    /// Used in bias force computation (gyroscopic wrench).
    pub fn cross_force(&self, other: &SpatialVec) -> SpatialVec {
        let w = self.angular();
        let v = self.linear();
        let t = other.angular();
        let f = other.linear();
        SpatialVec::new(w.cross(&t) + v.cross(&f), w.cross(&f))
    }

    /// The 6x6 bracket matrix of `ad(self)`:
    ///
    /// ```text
    /// | [ω]×  0    |
    /// | [v]×  [ω]× |
    /// ```
    pub fn ad_matrix(&self) -> Mat6 {
        let wx = skew(&self.angular());
        let vx = skew(&self.linear());
        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&wx);
        m.fixed_view_mut::<3, 3>(3, 0).copy_from(&vx);
        m.fixed_view_mut::<3, 3>(3, 3).copy_from(&wx);
        m
    }

    /// Dot product of two spatial vectors.
    #[inline]
    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.data.dot(&other.data)
    }

    /// True when every component is finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

impl std::ops::Add for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn add(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            data: self.data + rhs.data,
        }
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn sub(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            data: self.data - rhs.data,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn mul(self, rhs: f64) -> SpatialVec {
        SpatialVec {
            data: self.data * rhs,
        }
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn neg(self) -> SpatialVec {
        SpatialVec { data: -self.data }
    }
}

/// Spatial inertia of a rigid body, stored as mass, center of mass in the
/// body frame, and rotational inertia about the center of mass.
#[derive(Debug, Clone, Copy)]
pub struct SpatialInertia {
    /// Mass of the body.
    pub mass: f64,
    /// Center of mass position in body frame.
    pub com: Vec3,
    /// Rotational inertia about the center of mass (3x3 symmetric).
    pub moment: Mat3,
}

impl SpatialInertia {
    /// Create a spatial inertia with the given mass, CoM offset, and moment.
    pub fn new(mass: f64, com: Vec3, moment: Mat3) -> Self {
        Self { mass, com, moment }
    }

    /// Point mass at a given position in the body frame.
    pub fn point_mass(mass: f64, pos: Vec3) -> Self {
        Self {
            mass,
            com: pos,
            moment: Mat3::zeros(),
        }
    }

    /// Uniform solid sphere centered at the body origin.
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 2.0 / 5.0 * mass * radius * radius;
        Self {
            mass,
            com: Vec3::zeros(),
            moment: Mat3::from_diagonal(&Vec3::new(i, i, i)),
        }
    }

    /// Uniform solid box with the given half-extents, centered at the origin.
    pub fn cuboid(mass: f64, half_extents: Vec3) -> Self {
        let f = mass / 3.0;
        let (x2, y2, z2) = (
            half_extents.x * half_extents.x,
            half_extents.y * half_extents.y,
            half_extents.z * half_extents.z,
        );
        Self {
            mass,
            com: Vec3::zeros(),
            moment: Mat3::from_diagonal(&Vec3::new(f * (y2 + z2), f * (x2 + z2), f * (x2 + y2))),
        }
    }

    /// Uniform rod of the given length along the local Y axis, centered.
    pub fn rod(mass: f64, length: f64) -> Self {
        let i = mass * length * length / 12.0;
        Self {
            mass,
            com: Vec3::zeros(),
            moment: Mat3::from_diagonal(&Vec3::new(i, 0.0, i)),
        }
    }

    /// The 6x6 spatial inertia matrix about the body frame origin:
    ///
    /// ```text
    /// | J + m [c]× [c]×ᵀ   m [c]× |
    /// | m [c]×ᵀ            m E    |
    /// ```
    pub fn to_matrix(&self) -> Mat6 {
        let cx = skew(&self.com);
        let m = self.mass;

        let mut mat = Mat6::zeros();
        let top_left = self.moment + cx * cx.transpose() * m;
        let mcx = cx * m;
        mat.fixed_view_mut::<3, 3>(0, 0).copy_from(&top_left);
        mat.fixed_view_mut::<3, 3>(0, 3).copy_from(&mcx);
        mat.fixed_view_mut::<3, 3>(3, 0).copy_from(&mcx.transpose());
        mat.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Mat3::identity() * m));
        mat
    }

    /// True when mass, CoM, and moment are all finite and mass is positive.
    pub fn is_valid(&self) -> bool {
        self.mass.is_finite()
            && self.mass > 0.0
            && self.com.iter().all(|x| x.is_finite())
            && self.moment.iter().all(|x| x.is_finite())
    }
}

/// Express a 6x6 inertia given in a child frame in the parent frame, where
/// `t` is the pose of the child frame in the parent frame:
/// `I_parent = Ad(T⁻¹)ᵀ · I_child · Ad(T⁻¹)`.
pub fn transform_inertia(t: &Transform, inertia: &Mat6) -> Mat6 {
    let x = t.ad_inv_matrix();
    x.transpose() * inertia * x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cross_motion_matches_bracket_matrix() {
        let a = SpatialVec::new(Vec3::new(0.2, -0.4, 0.6), Vec3::new(1.0, 0.5, -0.3));
        let b = SpatialVec::new(Vec3::new(-0.1, 0.9, 0.3), Vec3::new(0.2, 0.2, 0.7));
        let by_op = a.cross_motion(&b);
        let by_mat = a.ad_matrix() * b.data;
        assert_relative_eq!(by_op.data, by_mat, epsilon = 1e-12);
    }

    #[test]
    fn cross_force_is_negative_transpose_bracket() {
        // v ×f f = -ad(v)ᵀ f
        let v = SpatialVec::new(Vec3::new(0.3, 0.1, -0.2), Vec3::new(0.5, -0.5, 0.4));
        let f = SpatialVec::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.5, 0.2));
        let by_op = v.cross_force(&f);
        let by_mat = -(v.ad_matrix().transpose() * f.data);
        assert_relative_eq!(by_op.data, by_mat, epsilon = 1e-12);
    }

    #[test]
    fn sphere_inertia_matrix_is_symmetric() {
        let si = SpatialInertia::sphere(3.0, 0.4);
        let m = si.to_matrix();
        assert_relative_eq!(m, m.transpose(), epsilon = 1e-12);
        assert_relative_eq!(m[(3, 3)], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn point_mass_matrix_couples_com() {
        let si = SpatialInertia::point_mass(2.0, Vec3::new(0.0, 1.0, 0.0));
        let m = si.to_matrix();
        // Angular inertia about the origin for a point mass at distance 1.
        assert_relative_eq!(m[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(m[(2, 2)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(m[(1, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn transformed_inertia_stays_symmetric() {
        let si = SpatialInertia::new(
            1.5,
            Vec3::new(0.1, 0.2, 0.0),
            Mat3::from_diagonal(&Vec3::new(0.2, 0.3, 0.4)),
        );
        let t = Transform::new(
            crate::lie::exp_map_rot(&Vec3::new(0.4, 0.1, -0.3)),
            Vec3::new(0.5, -1.0, 2.0),
        );
        let moved = transform_inertia(&t, &si.to_matrix());
        assert_relative_eq!(moved, moved.transpose(), epsilon = 1e-10);
        // Mass block is rotation invariant.
        assert_relative_eq!(moved[(3, 3)] + moved[(4, 4)] + moved[(5, 5)], 4.5, epsilon = 1e-10);
    }
}
