//! Bilateral joint constraints: ball (point coincidence) and weld
//! (full relative pose lock) between two bodies of any skeletons.

use crate::constraint::{Constraint, ConstraintInfo, ContactParams};
use arbor_dynamics::Skeleton;
use arbor_math::{log_map, SpatialVec, Transform, Vec3};

/// Keeps one anchor point of each body coincident (3 rows, unbounded).
pub struct BallJointConstraint {
    skeleton1: usize,
    body1: usize,
    skeleton2: usize,
    body2: usize,
    /// Anchor in each body's local frame.
    anchor1: Vec3,
    anchor2: Vec3,
    params: ContactParams,
    jacobians1: [SpatialVec; 3],
    jacobians2: [SpatialVec; 3],
    violation: Vec3,
    applied_index: usize,
    active: bool,
}

impl BallJointConstraint {
    /// Connect two bodies at the given world anchor point.
    pub fn new(
        skeletons: &[Skeleton],
        (skeleton1, body1): (usize, usize),
        (skeleton2, body2): (usize, usize),
        world_anchor: Vec3,
        params: &ContactParams,
    ) -> Self {
        let w1 = skeletons[skeleton1].body(body1).world_transform;
        let w2 = skeletons[skeleton2].body(body2).world_transform;
        Self {
            skeleton1,
            body1,
            skeleton2,
            body2,
            anchor1: w1.inverse().transform_point(&world_anchor),
            anchor2: w2.inverse().transform_point(&world_anchor),
            params: *params,
            jacobians1: [SpatialVec::zero(); 3],
            jacobians2: [SpatialVec::zero(); 3],
            violation: Vec3::zeros(),
            applied_index: 0,
            active: false,
        }
    }
}

impl Constraint for BallJointConstraint {
    fn dimension(&self) -> usize {
        3
    }

    fn update(&mut self, skeletons: &[Skeleton]) {
        let skel1 = &skeletons[self.skeleton1];
        let skel2 = &skeletons[self.skeleton2];
        self.active = skel1.is_impulse_responsible() || skel2.is_impulse_responsible();
        if !self.active {
            return;
        }
        let w1 = skel1.body(self.body1).world_transform;
        let w2 = skel2.body(self.body2).world_transform;
        self.violation = w1.transform_point(&self.anchor1) - w2.transform_point(&self.anchor2);

        for (k, e) in [Vec3::x(), Vec3::y(), Vec3::z()].iter().enumerate() {
            let d1 = w1.rot.transpose() * e;
            let d2 = w2.rot.transpose() * (-e);
            self.jacobians1[k] = SpatialVec::new(self.anchor1.cross(&d1), d1);
            self.jacobians2[k] = SpatialVec::new(self.anchor2.cross(&d2), d2);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn involved_skeletons(&self) -> (usize, Option<usize>) {
        (self.skeleton1, Some(self.skeleton2))
    }

    fn get_information(&mut self, skeletons: &[Skeleton], info: &mut ConstraintInfo) {
        let skel1 = &skeletons[self.skeleton1];
        let skel2 = &skeletons[self.skeleton2];
        for r in 0..3 {
            let mut rel_vel = 0.0;
            if skel1.is_impulse_responsible() {
                rel_vel -= self.jacobians1[r].dot(&skel1.body(self.body1).velocity);
            }
            if skel2.is_impulse_responsible() {
                rel_vel -= self.jacobians2[r].dot(&skel2.body(self.body2).velocity);
            }
            let correction = (self.params.erp * info.inv_time_step * self.violation[r])
                .clamp(
                    -self.params.max_error_reduction_velocity,
                    self.params.max_error_reduction_velocity,
                );
            info.b[r] = rel_vel - correction;
            info.lo[r] = f64::NEG_INFINITY;
            info.hi[r] = f64::INFINITY;
            info.findex[r] = -1;
            info.x[r] = 0.0;
        }
    }

    fn apply_unit_impulse(&mut self, skeletons: &mut [Skeleton], index: usize) {
        apply_pair_unit_impulse(
            skeletons,
            (self.skeleton1, self.body1, &self.jacobians1[index]),
            (self.skeleton2, self.body2, &self.jacobians2[index]),
        );
        self.applied_index = index;
    }

    fn get_velocity_change(&self, skeletons: &[Skeleton], delta_v: &mut [f64], with_cfm: bool) {
        let skel1 = &skeletons[self.skeleton1];
        let skel2 = &skeletons[self.skeleton2];
        for (r, dv) in delta_v.iter_mut().enumerate().take(3) {
            *dv = 0.0;
            if skel1.is_impulse_applied() && skel1.is_impulse_responsible() {
                *dv += self.jacobians1[r].dot(&skel1.body(self.body1).velocity_change);
            }
            if skel2.is_impulse_applied() && skel2.is_impulse_responsible() {
                *dv += self.jacobians2[r].dot(&skel2.body(self.body2).velocity_change);
            }
        }
        if with_cfm {
            delta_v[self.applied_index] += delta_v[self.applied_index] * self.params.cfm;
        }
    }

    fn unexcite(&self, skeletons: &mut [Skeleton]) {
        skeletons[self.skeleton1].set_impulse_applied(false);
        skeletons[self.skeleton2].set_impulse_applied(false);
    }

    fn apply_impulse(&mut self, skeletons: &mut [Skeleton], impulses: &[f64]) {
        for r in 0..3 {
            if skeletons[self.skeleton1].is_impulse_responsible() {
                skeletons[self.skeleton1]
                    .body_mut(self.body1)
                    .add_constraint_impulse(&(self.jacobians1[r] * impulses[r]));
            }
            if skeletons[self.skeleton2].is_impulse_responsible() {
                skeletons[self.skeleton2]
                    .body_mut(self.body2)
                    .add_constraint_impulse(&(self.jacobians2[r] * impulses[r]));
            }
        }
    }
}

/// Locks the full relative pose of two bodies (6 rows, unbounded).
pub struct WeldJointConstraint {
    skeleton1: usize,
    body1: usize,
    skeleton2: usize,
    body2: usize,
    /// Pose of body 2 in body 1's frame at construction time.
    relative: Transform,
    params: ContactParams,
    jacobians1: [SpatialVec; 6],
    jacobians2: [SpatialVec; 6],
    violation: SpatialVec,
    applied_index: usize,
    active: bool,
}

impl WeldJointConstraint {
    /// Weld two bodies at their current relative pose.
    pub fn new(
        skeletons: &[Skeleton],
        (skeleton1, body1): (usize, usize),
        (skeleton2, body2): (usize, usize),
        params: &ContactParams,
    ) -> Self {
        let w1 = skeletons[skeleton1].body(body1).world_transform;
        let w2 = skeletons[skeleton2].body(body2).world_transform;
        Self {
            skeleton1,
            body1,
            skeleton2,
            body2,
            relative: w1.inverse().mul(&w2),
            params: *params,
            jacobians1: [SpatialVec::zero(); 6],
            jacobians2: [SpatialVec::zero(); 6],
            violation: SpatialVec::zero(),
            applied_index: 0,
            active: false,
        }
    }

    fn basis(r: usize) -> SpatialVec {
        let mut v = SpatialVec::zero();
        v.data[r] = 1.0;
        v
    }
}

impl Constraint for WeldJointConstraint {
    fn dimension(&self) -> usize {
        6
    }

    fn update(&mut self, skeletons: &[Skeleton]) {
        let skel1 = &skeletons[self.skeleton1];
        let skel2 = &skeletons[self.skeleton2];
        self.active = skel1.is_impulse_responsible() || skel2.is_impulse_responsible();
        if !self.active {
            return;
        }
        let w1 = skel1.body(self.body1).world_transform;
        let w2 = skel2.body(self.body2).world_transform;
        // Pose drift of body 2 relative to where the weld wants it.
        let t12 = w1.inverse().mul(&w2);
        self.violation = log_map(&t12.mul(&self.relative.inverse()));

        // Rows measure the relative twist in body 1's frame:
        // J V = V1 - Ad(T12) V2.
        for r in 0..6 {
            let e = Self::basis(r);
            self.jacobians1[r] = e;
            self.jacobians2[r] = -t12.dad(&e);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn involved_skeletons(&self) -> (usize, Option<usize>) {
        (self.skeleton1, Some(self.skeleton2))
    }

    fn get_information(&mut self, skeletons: &[Skeleton], info: &mut ConstraintInfo) {
        let skel1 = &skeletons[self.skeleton1];
        let skel2 = &skeletons[self.skeleton2];
        for r in 0..6 {
            let mut rel_vel = 0.0;
            if skel1.is_impulse_responsible() {
                rel_vel -= self.jacobians1[r].dot(&skel1.body(self.body1).velocity);
            }
            if skel2.is_impulse_responsible() {
                rel_vel -= self.jacobians2[r].dot(&skel2.body(self.body2).velocity);
            }
            let correction = (self.params.erp * info.inv_time_step * self.violation.data[r])
                .clamp(
                    -self.params.max_error_reduction_velocity,
                    self.params.max_error_reduction_velocity,
                );
            info.b[r] = rel_vel + correction;
            info.lo[r] = f64::NEG_INFINITY;
            info.hi[r] = f64::INFINITY;
            info.findex[r] = -1;
            info.x[r] = 0.0;
        }
    }

    fn apply_unit_impulse(&mut self, skeletons: &mut [Skeleton], index: usize) {
        apply_pair_unit_impulse(
            skeletons,
            (self.skeleton1, self.body1, &self.jacobians1[index]),
            (self.skeleton2, self.body2, &self.jacobians2[index]),
        );
        self.applied_index = index;
    }

    fn get_velocity_change(&self, skeletons: &[Skeleton], delta_v: &mut [f64], with_cfm: bool) {
        let skel1 = &skeletons[self.skeleton1];
        let skel2 = &skeletons[self.skeleton2];
        for (r, dv) in delta_v.iter_mut().enumerate().take(6) {
            *dv = 0.0;
            if skel1.is_impulse_applied() && skel1.is_impulse_responsible() {
                *dv += self.jacobians1[r].dot(&skel1.body(self.body1).velocity_change);
            }
            if skel2.is_impulse_applied() && skel2.is_impulse_responsible() {
                *dv += self.jacobians2[r].dot(&skel2.body(self.body2).velocity_change);
            }
        }
        if with_cfm {
            delta_v[self.applied_index] += delta_v[self.applied_index] * self.params.cfm;
        }
    }

    fn unexcite(&self, skeletons: &mut [Skeleton]) {
        skeletons[self.skeleton1].set_impulse_applied(false);
        skeletons[self.skeleton2].set_impulse_applied(false);
    }

    fn apply_impulse(&mut self, skeletons: &mut [Skeleton], impulses: &[f64]) {
        for r in 0..6 {
            if skeletons[self.skeleton1].is_impulse_responsible() {
                skeletons[self.skeleton1]
                    .body_mut(self.body1)
                    .add_constraint_impulse(&(self.jacobians1[r] * impulses[r]));
            }
            if skeletons[self.skeleton2].is_impulse_responsible() {
                skeletons[self.skeleton2]
                    .body_mut(self.body2)
                    .add_constraint_impulse(&(self.jacobians2[r] * impulses[r]));
            }
        }
    }
}

// Sign conventions: the ball rows measure d/dt(anchor1 - anchor2), so the
// error-reduction term enters the bias negated; the weld rows measure the
// relative twist xi with d/dt(pose drift) = -xi, so there it enters with a
// plus. The tests below pin both against hand-computed cases.

/// Shared unit-impulse propagation for two-body constraints.
fn apply_pair_unit_impulse(
    skeletons: &mut [Skeleton],
    (s1, b1, j1): (usize, usize, &SpatialVec),
    (s2, b2, j2): (usize, usize, &SpatialVec),
) {
    if s1 == s2 {
        let skel = &mut skeletons[s1];
        if skel.is_impulse_responsible() {
            skel.clear_constraint_impulses();
            skel.body_mut(b1).add_constraint_impulse(j1);
            skel.body_mut(b2).add_constraint_impulse(j2);
            skel.propagate_bias_impulses();
            skel.update_velocity_change();
            skel.set_impulse_applied(true);
        }
    } else {
        if skeletons[s1].is_impulse_responsible() {
            let skel = &mut skeletons[s1];
            skel.clear_constraint_impulses();
            skel.body_mut(b1).add_constraint_impulse(j1);
            skel.propagate_bias_impulses();
            skel.update_velocity_change();
            skel.set_impulse_applied(true);
        }
        if skeletons[s2].is_impulse_responsible() {
            let skel = &mut skeletons[s2];
            skel.clear_constraint_impulses();
            skel.body_mut(b2).add_constraint_impulse(j2);
            skel.propagate_bias_impulses();
            skel.update_velocity_change();
            skel.set_impulse_applied(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use arbor_dynamics::{BodyNode, Joint, Skeleton};
    use arbor_math::{DVec, SpatialInertia};

    fn free_body_at(name: &str, x: f64) -> Skeleton {
        let mut skel = Skeleton::new(name);
        skel.add_body(
            None,
            Joint::free("root"),
            BodyNode::new(name, SpatialInertia::sphere(1.0, 0.1)),
        );
        skel.init(1e-3, Vec3::zeros()).unwrap();
        let mut q = DVec::zeros(6);
        q[3] = x;
        skel.set_positions(&q);
        skel.ensure_kinematics();
        skel
    }

    fn gather_bias(c: &mut dyn Constraint, skeletons: &[Skeleton]) -> Vec<f64> {
        let dim = c.dimension();
        let mut x = vec![0.0; dim];
        let mut lo = vec![0.0; dim];
        let mut hi = vec![0.0; dim];
        let mut b = vec![0.0; dim];
        let mut w = vec![0.0; dim];
        let mut findex = vec![-1i64; dim];
        let mut info = ConstraintInfo {
            x: &mut x,
            lo: &mut lo,
            hi: &mut hi,
            b: &mut b,
            w: &mut w,
            findex: &mut findex,
            inv_time_step: 1e3,
        };
        c.get_information(skeletons, &mut info);
        b
    }

    #[test]
    fn ball_bias_cancels_relative_anchor_velocity() {
        // Anchors of both bodies coincide at the origin; body a slides +y.
        let mut skels = vec![free_body_at("a", 0.5), free_body_at("b", -0.5)];
        let mut c = BallJointConstraint::new(
            &skels,
            (0, 0),
            (1, 0),
            Vec3::zeros(),
            &ContactParams::default(),
        );
        let mut v = DVec::zeros(6);
        v[4] = 1.0;
        skels[0].set_velocities(&v);
        skels[0].ensure_kinematics();
        c.update(&skels);

        let b = gather_bias(&mut c, &skels);
        assert_relative_eq!(b[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(b[1], -1.0, epsilon = 1e-12);
        assert_relative_eq!(b[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ball_bias_pushes_back_along_violation() {
        // Body a drifts so its anchor sits 0.01 ahead of body b's in +x.
        let mut skels = vec![free_body_at("a", 0.5), free_body_at("b", -0.5)];
        let mut c = BallJointConstraint::new(
            &skels,
            (0, 0),
            (1, 0),
            Vec3::zeros(),
            &ContactParams::default(),
        );
        let mut q = DVec::zeros(6);
        q[3] = 0.51;
        skels[0].set_positions(&q);
        skels[0].ensure_kinematics();
        c.update(&skels);

        let b = gather_bias(&mut c, &skels);
        // erp / dt * violation = 0.01 * 1e3 * 0.01, aimed back along -x.
        assert_relative_eq!(b[0], -0.1, epsilon = 1e-12);
        assert_relative_eq!(b[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(b[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn weld_bias_cancels_relative_velocity() {
        // Body b slides +x away from body a.
        let mut skels = vec![free_body_at("a", 0.0), free_body_at("b", 1.0)];
        let mut c =
            WeldJointConstraint::new(&skels, (0, 0), (1, 0), &ContactParams::default());
        let mut v = DVec::zeros(6);
        v[3] = 1.0;
        skels[1].set_velocities(&v);
        skels[1].ensure_kinematics();
        c.update(&skels);

        let b = gather_bias(&mut c, &skels);
        for (r, br) in b.iter().enumerate() {
            // Row 3 demands body a catch up along +x; the rest are quiet.
            let expected = if r == 3 { 1.0 } else { 0.0 };
            assert_relative_eq!(*br, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn weld_bias_closes_pose_drift() {
        // Body b has drifted 0.01 beyond the welded relative pose.
        let mut skels = vec![free_body_at("a", 0.0), free_body_at("b", 1.0)];
        let mut c =
            WeldJointConstraint::new(&skels, (0, 0), (1, 0), &ContactParams::default());
        let mut q = DVec::zeros(6);
        q[3] = 1.01;
        skels[1].set_positions(&q);
        skels[1].ensure_kinematics();
        c.update(&skels);

        let b = gather_bias(&mut c, &skels);
        for (r, br) in b.iter().enumerate() {
            // erp / dt * drift = 0.01 * 1e3 * 0.01 of relative closing
            // velocity for body a toward body b.
            let expected = if r == 3 { 0.1 } else { 0.0 };
            assert_relative_eq!(*br, expected, epsilon = 1e-12);
        }
    }
}
