//! Joint kinds: local transform, motion subspace, and its time derivative.
//!
//! Every joint relates its parent body frame to its child body frame via
//! `T = parent_to_joint * T(q) * child_to_joint^-1`, where
//! `parent_to_joint` / `child_to_joint` are the constant poses of the
//! joint frame in the respective body frames. The motion subspace `S`
//! maps generalized velocities to the child body twist and is expressed
//! in the child body frame.

use crate::error::{DynamicsError, Result};
use crate::gencoord::GenCoord;
use arbor_math::{
    exp_map, exp_map_rot, log_map, log_map_rot, verify_transform, DVec, Jacobian, Mat3,
    SpatialVec, Transform, Vec3,
};

/// Euler-angle convention for [`JointKind::Euler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EulerConvention {
    /// Intrinsic rotations about X, then Y, then Z.
    Xyz,
    /// Intrinsic rotations about Z, then Y, then X.
    Zyx,
}

/// Plane selection for [`JointKind::Planar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneType {
    Xy,
    Yz,
    Zx,
    Arbitrary,
}

/// The closed set of joint models.
///
/// Ball and free joints carry an internal group element integrated on the
/// manifold; their three/six coordinates are refreshed from its logarithm
/// so the parameterization never hits the log-map singularity during
/// integration.
#[derive(Debug, Clone)]
pub enum JointKind {
    /// Rigid attachment, 0 DOF.
    Fixed,
    /// Rotation about `axis`, 1 DOF.
    Revolute { axis: Vec3 },
    /// Translation along `axis`, 1 DOF.
    Prismatic { axis: Vec3 },
    /// Coupled rotation/translation about `axis`; `pitch` is the advance
    /// per full turn. 1 DOF.
    Screw { axis: Vec3, pitch: f64 },
    /// Two successive rotations about `axis1` then `axis2`, 2 DOF.
    Universal { axis1: Vec3, axis2: Vec3 },
    /// Orientation on SO(3), 3 DOF, log-map parameterized.
    Ball { rot: Mat3 },
    /// Three Euler angles in the given convention, 3 DOF.
    Euler { convention: EulerConvention },
    /// Translation along the three coordinate axes, 3 DOF.
    Translational,
    /// Two in-plane translations plus rotation about the plane normal,
    /// 3 DOF.
    Planar {
        plane_type: PlaneType,
        trans_axis1: Vec3,
        trans_axis2: Vec3,
        rot_axis: Vec3,
    },
    /// Full rigid motion on SE(3), 6 DOF, twist-parameterized.
    Free { pose: Transform },
}

/// A joint connecting a parent body to its child body.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    /// Pose of the joint frame in the parent body frame.
    pub parent_to_joint: Transform,
    /// Pose of the joint frame in the child body frame.
    pub child_to_joint: Transform,
    /// Generalized coordinates owned by this joint.
    pub gencoords: Vec<GenCoord>,
    /// Whether position limits generate joint-limit constraints.
    pub position_limited: bool,

    /// Cached local transform `T(q)` mapped through the frame offsets.
    pub transform: Transform,
    /// Cached motion subspace `S(q)`, 6 x ndof, child body frame.
    pub jacobian: Jacobian,
    /// Cached time derivative `dS(q, v)`.
    pub jacobian_dot: Jacobian,
}

impl Joint {
    fn with_kind(name: &str, kind: JointKind) -> Self {
        let n = dof_count(&kind);
        Self {
            name: name.to_string(),
            kind,
            parent_to_joint: Transform::identity(),
            child_to_joint: Transform::identity(),
            gencoords: vec![GenCoord::new(); n],
            position_limited: true,
            transform: Transform::identity(),
            jacobian: Jacobian::zeros(n),
            jacobian_dot: Jacobian::zeros(n),
        }
    }

    pub fn fixed(name: &str) -> Self {
        Self::with_kind(name, JointKind::Fixed)
    }

    pub fn revolute(name: &str, axis: Vec3) -> Self {
        Self::with_kind(name, JointKind::Revolute { axis })
    }

    pub fn prismatic(name: &str, axis: Vec3) -> Self {
        Self::with_kind(name, JointKind::Prismatic { axis })
    }

    pub fn screw(name: &str, axis: Vec3, pitch: f64) -> Self {
        Self::with_kind(name, JointKind::Screw { axis, pitch })
    }

    pub fn universal(name: &str, axis1: Vec3, axis2: Vec3) -> Self {
        Self::with_kind(name, JointKind::Universal { axis1, axis2 })
    }

    pub fn ball(name: &str) -> Self {
        Self::with_kind(
            name,
            JointKind::Ball {
                rot: Mat3::identity(),
            },
        )
    }

    pub fn euler(name: &str, convention: EulerConvention) -> Self {
        Self::with_kind(name, JointKind::Euler { convention })
    }

    pub fn translational(name: &str) -> Self {
        Self::with_kind(name, JointKind::Translational)
    }

    /// Planar joint on one of the coordinate planes.
    pub fn planar(name: &str, plane: PlaneType) -> Self {
        let (a1, a2, n) = match plane {
            PlaneType::Xy => (Vec3::x(), Vec3::y(), Vec3::z()),
            PlaneType::Yz => (Vec3::y(), Vec3::z(), Vec3::x()),
            PlaneType::Zx => (Vec3::z(), Vec3::x(), Vec3::y()),
            PlaneType::Arbitrary => {
                panic!("use Joint::planar_arbitrary for an arbitrary plane")
            }
        };
        Self::with_kind(
            name,
            JointKind::Planar {
                plane_type: plane,
                trans_axis1: a1,
                trans_axis2: a2,
                rot_axis: n,
            },
        )
    }

    /// Planar joint on the plane spanned by two orthogonal translational
    /// axes; the rotation axis is their cross product.
    pub fn planar_arbitrary(name: &str, trans_axis1: Vec3, trans_axis2: Vec3) -> Self {
        let a1 = trans_axis1.normalize();
        let a2 = trans_axis2.normalize();
        let n = a1.cross(&a2);
        Self::with_kind(
            name,
            JointKind::Planar {
                plane_type: PlaneType::Arbitrary,
                trans_axis1: a1,
                trans_axis2: a2,
                rot_axis: n.normalize(),
            },
        )
    }

    pub fn free(name: &str) -> Self {
        Self::with_kind(
            name,
            JointKind::Free {
                pose: Transform::identity(),
            },
        )
    }

    pub fn with_parent_to_joint(mut self, t: Transform) -> Self {
        debug_assert!(verify_transform(&t));
        self.parent_to_joint = t;
        self
    }

    pub fn with_child_to_joint(mut self, t: Transform) -> Self {
        debug_assert!(verify_transform(&t));
        self.child_to_joint = t;
        self
    }

    /// Number of degrees of freedom.
    pub fn num_dofs(&self) -> usize {
        dof_count(&self.kind)
    }

    /// Joint positions as a vector.
    pub fn positions(&self) -> DVec {
        DVec::from_iterator(self.gencoords.len(), self.gencoords.iter().map(|g| g.q))
    }

    /// Joint velocities as a vector.
    pub fn velocities(&self) -> DVec {
        DVec::from_iterator(self.gencoords.len(), self.gencoords.iter().map(|g| g.v))
    }

    /// Implicit spring forces for all DOFs.
    pub fn spring_forces(&self, dt: f64) -> DVec {
        DVec::from_iterator(
            self.gencoords.len(),
            self.gencoords.iter().map(|g| g.spring_force(dt)),
        )
    }

    /// Damping forces for all DOFs.
    pub fn damping_forces(&self) -> DVec {
        DVec::from_iterator(
            self.gencoords.len(),
            self.gencoords.iter().map(|g| g.damping_force()),
        )
    }

    /// Spring potential energy.
    pub fn potential_energy(&self) -> f64 {
        self.gencoords
            .iter()
            .map(|g| {
                let d = g.q - g.rest_position;
                0.5 * g.spring_stiffness * d * d
            })
            .sum()
    }

    /// Validate joint parameters; run before the skeleton starts stepping.
    pub fn validate(&self) -> Result<()> {
        if !verify_transform(&self.parent_to_joint) || !verify_transform(&self.child_to_joint) {
            return Err(DynamicsError::InvalidJointOffset(self.name.clone()));
        }
        let unit = |v: &Vec3| (v.norm() - 1.0).abs() < 1e-8;
        match &self.kind {
            JointKind::Revolute { axis }
            | JointKind::Prismatic { axis }
            | JointKind::Screw { axis, .. } => {
                if !unit(axis) {
                    return Err(DynamicsError::NonUnitAxis(self.name.clone()));
                }
            }
            JointKind::Universal { axis1, axis2 } => {
                if !unit(axis1) || !unit(axis2) {
                    return Err(DynamicsError::NonUnitAxis(self.name.clone()));
                }
            }
            JointKind::Planar {
                trans_axis1,
                trans_axis2,
                rot_axis,
                ..
            } => {
                if !unit(trans_axis1) || !unit(trans_axis2) || !unit(rot_axis) {
                    return Err(DynamicsError::NonUnitAxis(self.name.clone()));
                }
                if trans_axis1.dot(trans_axis2).abs() > 1e-6 {
                    return Err(DynamicsError::NonOrthogonalAxes(self.name.clone()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Recompute the local transform from the current positions.
    pub fn update_transform(&mut self) {
        let q = self.positions();
        let local = match &mut self.kind {
            JointKind::Fixed => Transform::identity(),
            JointKind::Revolute { axis } => Transform::from_rotation(exp_map_rot(&(*axis * q[0]))),
            JointKind::Prismatic { axis } => Transform::from_translation(*axis * q[0]),
            JointKind::Screw { axis, pitch } => Transform::new(
                exp_map_rot(&(*axis * q[0])),
                *axis * (*pitch * q[0] / std::f64::consts::TAU),
            ),
            JointKind::Universal { axis1, axis2 } => Transform::from_rotation(
                exp_map_rot(&(*axis1 * q[0])) * exp_map_rot(&(*axis2 * q[1])),
            ),
            JointKind::Ball { rot } => {
                *rot = exp_map_rot(&Vec3::new(q[0], q[1], q[2]));
                Transform::from_rotation(*rot)
            }
            JointKind::Euler { convention } => {
                Transform::from_rotation(euler_rotation(*convention, &q))
            }
            JointKind::Translational => Transform::from_translation(Vec3::new(q[0], q[1], q[2])),
            JointKind::Planar {
                trans_axis1,
                trans_axis2,
                rot_axis,
                ..
            } => Transform::new(
                exp_map_rot(&(*rot_axis * q[2])),
                *trans_axis1 * q[0] + *trans_axis2 * q[1],
            ),
            JointKind::Free { pose } => {
                *pose = exp_map(&SpatialVec::new(
                    Vec3::new(q[0], q[1], q[2]),
                    Vec3::new(q[3], q[4], q[5]),
                ));
                *pose
            }
        };
        self.transform = self
            .parent_to_joint
            .mul(&local)
            .mul(&self.child_to_joint.inverse());
        debug_assert!(verify_transform(&self.transform));
    }

    /// Recompute the motion subspace `S(q)`.
    pub fn update_jacobian(&mut self) {
        let q = self.positions();
        let cj = self.child_to_joint;
        match &self.kind {
            JointKind::Fixed => {}
            JointKind::Revolute { axis } => {
                set_col(&mut self.jacobian, 0, cj.ad(&SpatialVec::new(*axis, Vec3::zeros())));
            }
            JointKind::Prismatic { axis } => {
                set_col(&mut self.jacobian, 0, cj.ad(&SpatialVec::new(Vec3::zeros(), *axis)));
            }
            JointKind::Screw { axis, pitch } => {
                let s = SpatialVec::new(*axis, *axis * (*pitch / std::f64::consts::TAU));
                set_col(&mut self.jacobian, 0, cj.ad(&s));
            }
            JointKind::Universal { axis1, axis2 } => {
                // The first axis is seen through the (inverse of the)
                // second rotation.
                let x0 = cj.mul(&Transform::from_rotation(exp_map_rot(&(-*axis2 * q[1]))));
                set_col(&mut self.jacobian, 0, x0.ad(&SpatialVec::new(*axis1, Vec3::zeros())));
                set_col(&mut self.jacobian, 1, cj.ad(&SpatialVec::new(*axis2, Vec3::zeros())));
            }
            JointKind::Ball { .. } => {
                for (i, e) in [Vec3::x(), Vec3::y(), Vec3::z()].iter().enumerate() {
                    set_col(&mut self.jacobian, i, cj.ad(&SpatialVec::new(*e, Vec3::zeros())));
                }
            }
            JointKind::Euler { convention } => {
                let w = euler_jacobian_axes(*convention, &q);
                for (i, wi) in w.iter().enumerate() {
                    set_col(&mut self.jacobian, i, cj.ad(&SpatialVec::new(*wi, Vec3::zeros())));
                }
            }
            JointKind::Translational => {
                for (i, e) in [Vec3::x(), Vec3::y(), Vec3::z()].iter().enumerate() {
                    set_col(&mut self.jacobian, i, cj.ad(&SpatialVec::new(Vec3::zeros(), *e)));
                }
            }
            JointKind::Planar {
                trans_axis1,
                trans_axis2,
                rot_axis,
                ..
            } => {
                // Translational axes rotate with the in-plane rotation.
                let rt = exp_map_rot(&(*rot_axis * q[2])).transpose();
                set_col(&mut self.jacobian, 0, cj.ad(&SpatialVec::new(Vec3::zeros(), rt * trans_axis1)));
                set_col(&mut self.jacobian, 1, cj.ad(&SpatialVec::new(Vec3::zeros(), rt * trans_axis2)));
                set_col(&mut self.jacobian, 2, cj.ad(&SpatialVec::new(*rot_axis, Vec3::zeros())));
            }
            JointKind::Free { .. } => {
                for (i, e) in [Vec3::x(), Vec3::y(), Vec3::z()].iter().enumerate() {
                    set_col(&mut self.jacobian, i, cj.ad(&SpatialVec::new(*e, Vec3::zeros())));
                    set_col(&mut self.jacobian, i + 3, cj.ad(&SpatialVec::new(Vec3::zeros(), *e)));
                }
            }
        }
    }

    /// Recompute `dS(q, v)`.
    pub fn update_jacobian_time_deriv(&mut self) {
        let q = self.positions();
        let v = self.velocities();
        let cj = self.child_to_joint;
        match &self.kind {
            // Constant subspaces.
            JointKind::Fixed
            | JointKind::Revolute { .. }
            | JointKind::Prismatic { .. }
            | JointKind::Screw { .. }
            | JointKind::Ball { .. }
            | JointKind::Translational
            | JointKind::Free { .. } => {}
            JointKind::Universal { .. } => {
                let s0 = col(&self.jacobian, 0);
                let s1 = col(&self.jacobian, 1);
                set_col(&mut self.jacobian_dot, 0, -((s1 * v[1]).cross_motion(&s0)));
                // dS for the second axis is zero.
            }
            JointKind::Euler { convention } => {
                let dw = euler_jacobian_axes_deriv(*convention, &q, &v);
                for (i, dwi) in dw.iter().enumerate() {
                    set_col(&mut self.jacobian_dot, i, cj.ad(&SpatialVec::new(*dwi, Vec3::zeros())));
                }
            }
            JointKind::Planar {
                trans_axis1,
                trans_axis2,
                rot_axis,
                ..
            } => {
                let rt = exp_map_rot(&(*rot_axis * q[2])).transpose();
                let d1 = -rot_axis.cross(&(rt * trans_axis1)) * v[2];
                let d2 = -rot_axis.cross(&(rt * trans_axis2)) * v[2];
                set_col(&mut self.jacobian_dot, 0, cj.ad(&SpatialVec::new(Vec3::zeros(), d1)));
                set_col(&mut self.jacobian_dot, 1, cj.ad(&SpatialVec::new(Vec3::zeros(), d2)));
                // Rotation column is constant.
            }
        }
    }

    /// Integrate positions over `dt`, on the manifold where needed.
    pub fn integrate_positions(&mut self, dt: f64) {
        match &mut self.kind {
            JointKind::Ball { rot } => {
                let w = Vec3::new(
                    self.gencoords[0].v,
                    self.gencoords[1].v,
                    self.gencoords[2].v,
                );
                *rot *= exp_map_rot(&(w * dt));
                let q = log_map_rot(rot);
                for (g, qi) in self.gencoords.iter_mut().zip(q.iter()) {
                    g.q = *qi;
                }
            }
            JointKind::Free { pose } => {
                let xi = SpatialVec::new(
                    Vec3::new(
                        self.gencoords[0].v,
                        self.gencoords[1].v,
                        self.gencoords[2].v,
                    ),
                    Vec3::new(
                        self.gencoords[3].v,
                        self.gencoords[4].v,
                        self.gencoords[5].v,
                    ),
                );
                *pose = pose.mul(&exp_map(&(xi * dt)));
                let q = log_map(pose);
                for (g, qi) in self.gencoords.iter_mut().zip(q.data.iter()) {
                    g.q = *qi;
                }
            }
            _ => {
                for g in &mut self.gencoords {
                    g.q += g.v * dt;
                }
            }
        }
    }
}

fn dof_count(kind: &JointKind) -> usize {
    match kind {
        JointKind::Fixed => 0,
        JointKind::Revolute { .. } | JointKind::Prismatic { .. } | JointKind::Screw { .. } => 1,
        JointKind::Universal { .. } => 2,
        JointKind::Ball { .. }
        | JointKind::Euler { .. }
        | JointKind::Translational
        | JointKind::Planar { .. } => 3,
        JointKind::Free { .. } => 6,
    }
}

#[inline]
fn set_col(j: &mut Jacobian, i: usize, v: SpatialVec) {
    j.set_column(i, &v.data);
}

#[inline]
fn col(j: &Jacobian, i: usize) -> SpatialVec {
    SpatialVec::from_vec6(j.column(i).into_owned())
}

fn euler_rotation(convention: EulerConvention, q: &DVec) -> Mat3 {
    let rx = exp_map_rot(&(Vec3::x() * q[if convention == EulerConvention::Xyz { 0 } else { 2 }]));
    let ry = exp_map_rot(&(Vec3::y() * q[1]));
    let rz = exp_map_rot(&(Vec3::z() * q[if convention == EulerConvention::Xyz { 2 } else { 0 }]));
    match convention {
        EulerConvention::Xyz => rx * ry * rz,
        EulerConvention::Zyx => rz * ry * rx,
    }
}

/// Angular Jacobian columns in the joint child frame for the Euler joint.
fn euler_jacobian_axes(convention: EulerConvention, q: &DVec) -> [Vec3; 3] {
    let (s1, c1) = q[1].sin_cos();
    let (s2, c2) = q[2].sin_cos();
    match convention {
        EulerConvention::Xyz => [
            Vec3::new(c1 * c2, -c1 * s2, s1),
            Vec3::new(s2, c2, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ],
        EulerConvention::Zyx => [
            Vec3::new(-s1, c1 * s2, c1 * c2),
            Vec3::new(0.0, c2, -s2),
            Vec3::new(1.0, 0.0, 0.0),
        ],
    }
}

fn euler_jacobian_axes_deriv(convention: EulerConvention, q: &DVec, v: &DVec) -> [Vec3; 3] {
    let (s1, c1) = q[1].sin_cos();
    let (s2, c2) = q[2].sin_cos();
    let (dq1, dq2) = (v[1], v[2]);
    match convention {
        EulerConvention::Xyz => [
            Vec3::new(
                -s1 * c2 * dq1 - c1 * s2 * dq2,
                s1 * s2 * dq1 - c1 * c2 * dq2,
                c1 * dq1,
            ),
            Vec3::new(c2 * dq2, -s2 * dq2, 0.0),
            Vec3::zeros(),
        ],
        EulerConvention::Zyx => [
            Vec3::new(
                -c1 * dq1,
                -s1 * s2 * dq1 + c1 * c2 * dq2,
                -s1 * c2 * dq1 - c1 * s2 * dq2,
            ),
            Vec3::new(0.0, -s2 * dq2, -c2 * dq2),
            Vec3::zeros(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn set_q(j: &mut Joint, q: &[f64]) {
        for (g, qi) in j.gencoords.iter_mut().zip(q) {
            g.q = *qi;
        }
    }

    fn set_v(j: &mut Joint, v: &[f64]) {
        for (g, vi) in j.gencoords.iter_mut().zip(v) {
            g.v = *vi;
        }
    }

    #[test]
    fn revolute_transform_and_jacobian() {
        let mut j = Joint::revolute("hinge", Vec3::z());
        set_q(&mut j, &[std::f64::consts::FRAC_PI_2]);
        j.update_transform();
        j.update_jacobian();
        let x = j.transform.rotate(&Vec3::x());
        assert_relative_eq!(x, Vec3::y(), epsilon = 1e-12);
        assert_relative_eq!(
            j.jacobian.column(0).into_owned(),
            SpatialVec::new(Vec3::z(), Vec3::zeros()).data,
            epsilon = 1e-12
        );
    }

    #[test]
    fn child_offset_shifts_subspace() {
        // With the joint frame offset from the child frame, a revolute
        // axis picks up a linear component.
        let mut j = Joint::revolute("hinge", Vec3::z())
            .with_child_to_joint(Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        j.update_transform();
        j.update_jacobian();
        let s = j.jacobian.column(0).into_owned();
        assert_relative_eq!(s[2], 1.0, epsilon = 1e-12);
        // v = p x w with p = (1,0,0), w = z -> (0,-1,0).
        assert_relative_eq!(s[4], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn ball_integrates_on_manifold() {
        let mut j = Joint::ball("ball");
        set_v(&mut j, &[0.0, 0.0, 1.0]);
        let dt = 0.01;
        for _ in 0..100 {
            j.integrate_positions(dt);
        }
        // One radian about Z.
        assert_relative_eq!(j.gencoords[2].q, 1.0, epsilon = 1e-9);
        j.update_transform();
        assert_relative_eq!(
            j.transform.rotate(&Vec3::x()),
            Vec3::new(1.0f64.cos(), 1.0f64.sin(), 0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn free_joint_round_trips_pose() {
        let mut j = Joint::free("root");
        set_v(&mut j, &[0.0, 0.0, 0.5, 1.0, 0.0, 0.0]);
        j.integrate_positions(0.1);
        j.update_transform();
        let xi = log_map(&j.transform);
        assert_relative_eq!(xi.angular(), Vec3::new(0.0, 0.0, 0.05), epsilon = 1e-9);
        assert_relative_eq!(xi.linear().x, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn screw_couples_rotation_and_translation() {
        let mut j = Joint::screw("lead", Vec3::z(), 0.02);
        set_q(&mut j, &[std::f64::consts::TAU]);
        j.update_transform();
        // One full turn advances by the pitch.
        assert_relative_eq!(j.transform.pos.z, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn planar_arbitrary_derives_rotation_axis() {
        let j = Joint::planar_arbitrary("plane", Vec3::x(), Vec3::y());
        match &j.kind {
            JointKind::Planar { rot_axis, .. } => {
                assert_relative_eq!(*rot_axis, Vec3::z(), epsilon = 1e-12);
            }
            _ => unreachable!(),
        }
        assert!(j.validate().is_ok());
    }

    #[test]
    fn planar_rejects_parallel_axes() {
        let mut j = Joint::planar_arbitrary("bad", Vec3::x(), Vec3::x());
        // Force the degenerate axes past the constructor normalization.
        if let JointKind::Planar {
            trans_axis2,
            rot_axis,
            ..
        } = &mut j.kind
        {
            *trans_axis2 = Vec3::x();
            *rot_axis = Vec3::z();
        }
        assert!(matches!(
            j.validate(),
            Err(DynamicsError::NonOrthogonalAxes(_))
        ));
    }

    #[test]
    fn euler_jacobian_matches_finite_difference() {
        for convention in [EulerConvention::Xyz, EulerConvention::Zyx] {
            let mut j = Joint::euler("euler", convention);
            let q0 = [0.3, -0.4, 0.7];
            set_q(&mut j, &q0);
            j.update_transform();
            j.update_jacobian();

            let h = 1e-7;
            for dof in 0..3 {
                let mut jp = j.clone();
                let mut q = q0;
                q[dof] += h;
                set_q(&mut jp, &q);
                jp.update_transform();
                // Body angular velocity: [R^T dR]_vee / h.
                let r0 = j.transform.rot;
                let r1 = jp.transform.rot;
                let omega = log_map_rot(&(r0.transpose() * r1)) / h;
                let s = j.jacobian.column(dof).into_owned();
                assert_relative_eq!(Vec3::new(s[0], s[1], s[2]), omega, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn universal_jacobian_matches_finite_difference() {
        let mut j = Joint::universal("u", Vec3::x(), Vec3::y());
        let q0 = [0.5, -0.3];
        set_q(&mut j, &q0);
        j.update_transform();
        j.update_jacobian();

        let h = 1e-7;
        for dof in 0..2 {
            let mut jp = j.clone();
            let mut q = q0;
            q[dof] += h;
            set_q(&mut jp, &q);
            jp.update_transform();
            let omega = log_map_rot(&(j.transform.rot.transpose() * jp.transform.rot)) / h;
            let s = j.jacobian.column(dof).into_owned();
            assert_relative_eq!(Vec3::new(s[0], s[1], s[2]), omega, epsilon = 1e-5);
        }
    }

    #[test]
    fn jacobian_time_derivative_matches_finite_difference() {
        // dS(q, v) must equal the directional derivative of S along qdot.
        let joints = vec![
            Joint::universal("u", Vec3::x(), Vec3::y()),
            Joint::euler("exyz", EulerConvention::Xyz),
            Joint::euler("ezyx", EulerConvention::Zyx),
            Joint::planar_arbitrary("p", Vec3::x(), Vec3::y()),
        ];
        for mut joint in joints {
            let n = joint.num_dofs();
            let q0: Vec<f64> = (0..n).map(|k| 0.3 + 0.2 * k as f64).collect();
            let v0: Vec<f64> = (0..n).map(|k| 0.7 - 0.4 * k as f64).collect();
            set_q(&mut joint, &q0);
            set_v(&mut joint, &v0);
            joint.update_transform();
            joint.update_jacobian();
            joint.update_jacobian_time_deriv();

            let h = 1e-7;
            let mut advanced = joint.clone();
            let q1: Vec<f64> = q0.iter().zip(&v0).map(|(q, v)| q + v * h).collect();
            set_q(&mut advanced, &q1);
            advanced.update_transform();
            advanced.update_jacobian();

            let numeric = (&advanced.jacobian - &joint.jacobian) / h;
            for r in 0..6 {
                for c in 0..n {
                    assert_relative_eq!(
                        joint.jacobian_dot[(r, c)],
                        numeric[(r, c)],
                        epsilon = 1e-5
                    );
                }
            }
        }
    }

    #[test]
    fn rest_position_outside_limits_warns_but_keeps() {
        let mut j = Joint::revolute("hinge", Vec3::z());
        j.gencoords[0].q_min = -1.0;
        j.gencoords[0].q_max = 1.0;
        j.gencoords[0].set_rest_position(2.0);
        assert_relative_eq!(j.gencoords[0].rest_position, 2.0);
    }
}
