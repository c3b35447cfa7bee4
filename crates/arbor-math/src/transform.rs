//! Rigid transforms and their adjoint action on spatial vectors.

use crate::spatial::SpatialVec;
use crate::{skew, Mat3, Mat6, Vec3};

/// A rigid transform (element of SE(3)): rotation `rot` and translation `pos`.
///
/// `Transform { rot, pos }` is the pose of frame B expressed in frame A:
/// a point `p` in B coordinates maps to `rot * p + pos` in A coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation part (orthonormal, det +1).
    pub rot: Mat3,
    /// Translation part.
    pub pos: Vec3,
}

impl Transform {
    /// Create from rotation matrix and translation.
    #[inline]
    pub fn new(rot: Mat3, pos: Vec3) -> Self {
        Self { rot, pos }
    }

    /// Identity transform.
    #[inline]
    pub fn identity() -> Self {
        Self {
            rot: Mat3::identity(),
            pos: Vec3::zeros(),
        }
    }

    /// Pure rotation.
    #[inline]
    pub fn from_rotation(rot: Mat3) -> Self {
        Self {
            rot,
            pos: Vec3::zeros(),
        }
    }

    /// Pure translation.
    #[inline]
    pub fn from_translation(pos: Vec3) -> Self {
        Self {
            rot: Mat3::identity(),
            pos,
        }
    }

    /// Compose two transforms: `self * other` maps other's frame through self.
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            rot: self.rot * other.rot,
            pos: self.rot * other.pos + self.pos,
        }
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Transform {
        let rt = self.rot.transpose();
        Transform {
            rot: rt,
            pos: -(rt * self.pos),
        }
    }

    /// Map a point from frame B to frame A coordinates.
    #[inline]
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.rot * p + self.pos
    }

    /// Rotate a direction (no translation).
    #[inline]
    pub fn rotate(&self, d: &Vec3) -> Vec3 {
        self.rot * d
    }

    /// Adjoint action on a twist: `Ad(T) V = [R ω; R v + p × (R ω)]`.
    ///
    /// Transforms a motion vector expressed in frame B into frame A,
    /// where T is the pose of B in A.
    pub fn ad(&self, v: &SpatialVec) -> SpatialVec {
        let w = self.rot * v.angular();
        let lin = self.rot * v.linear() + self.pos.cross(&w);
        SpatialVec::new(w, lin)
    }

    /// Inverse adjoint on a twist: `Ad(T⁻¹) V = [Rᵀ ω; Rᵀ (v − p × ω)]`.
    pub fn ad_inv(&self, v: &SpatialVec) -> SpatialVec {
        let rt = self.rot.transpose();
        let w = rt * v.angular();
        let lin = rt * (v.linear() - self.pos.cross(&v.angular()));
        SpatialVec::new(w, lin)
    }

    /// Dual adjoint on a wrench: `dAd(T) F = Ad(T)ᵀ F = [Rᵀ (τ − p × f); Rᵀ f]`.
    ///
    /// Transforms a force vector expressed in frame A into frame B.
    pub fn dad(&self, f: &SpatialVec) -> SpatialVec {
        let rt = self.rot.transpose();
        let lin = rt * f.linear();
        let tau = rt * (f.angular() - self.pos.cross(&f.linear()));
        SpatialVec::new(tau, lin)
    }

    /// Inverse dual adjoint: `dAd(T⁻¹) F = Ad(T⁻¹)ᵀ F = [R τ + p × (R f); R f]`.
    ///
    /// Transforms a force vector expressed in frame B into frame A; this is
    /// how a child body's wrench is accumulated onto its parent.
    pub fn dad_inv(&self, f: &SpatialVec) -> SpatialVec {
        let lin = self.rot * f.linear();
        let tau = self.rot * f.angular() + self.pos.cross(&lin);
        SpatialVec::new(tau, lin)
    }

    /// The 6x6 matrix of `Ad(T)`:
    ///
    /// ```text
    /// | R       0 |
    /// | [p]× R  R |
    /// ```
    pub fn ad_matrix(&self) -> Mat6 {
        let px_r = skew(&self.pos) * self.rot;
        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rot);
        m.fixed_view_mut::<3, 3>(3, 0).copy_from(&px_r);
        m.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.rot);
        m
    }

    /// The 6x6 matrix of `Ad(T⁻¹)`.
    pub fn ad_inv_matrix(&self) -> Mat6 {
        self.inverse().ad_matrix()
    }
}
