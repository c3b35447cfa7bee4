//! Frictional contact constraints.

use crate::constraint::{
    Constraint, ConstraintInfo, ContactParams, BOUNCE_VELOCITY_THRESHOLD, CONTACT_EPSILON,
    FRICTION_THRESHOLD, MAX_BOUNCE_VELOCITY, RESTITUTION_THRESHOLD,
};
use arbor_collision::Contact;
use arbor_dynamics::Skeleton;
use arbor_math::{exp_map_rot, SpatialVec, Vec3};

/// A contact between two bodies: one normal row plus, when friction is
/// on, a pair of tangent rows boxed by the normal impulse.
pub struct ContactConstraint {
    contact: Contact,
    dim: usize,
    friction_on: bool,
    bounce_on: bool,
    restitution: f64,
    friction: f64,
    params: ContactParams,
    /// Per-row Jacobians in each body's frame.
    jacobians1: Vec<SpatialVec>,
    jacobians2: Vec<SpatialVec>,
    applied_index: usize,
    active: bool,
    /// Impulses committed by the last solve, one per row.
    pub applied_impulses: Vec<f64>,
}

impl ContactConstraint {
    pub fn new(contact: Contact, skeletons: &[Skeleton], params: &ContactParams) -> Self {
        let body1 = skeletons[contact.skeleton1].body(contact.body1);
        let body2 = skeletons[contact.skeleton2].body(contact.body2);

        // Material combination rules: restitution multiplies, friction
        // takes the smaller coefficient.
        let restitution = body1.restitution * body2.restitution;
        let bounce_on = restitution > RESTITUTION_THRESHOLD;
        let friction = body1.friction.min(body2.friction);
        let friction_on = friction > FRICTION_THRESHOLD;

        let dim = if friction_on { 3 } else { 1 };
        let mut jacobians1 = Vec::with_capacity(dim);
        let mut jacobians2 = Vec::with_capacity(dim);

        let w1 = body1.world_transform;
        let w2 = body2.world_transform;
        let p1 = w1.inverse().transform_point(&contact.point);
        let p2 = w2.inverse().transform_point(&contact.point);

        let mut directions = vec![contact.normal];
        if friction_on {
            let (t1, t2) = tangent_basis(&contact.normal, &params.first_friction_direction);
            directions.push(t1);
            directions.push(t2);
        }
        for dir in &directions {
            let d1 = w1.rot.transpose() * dir;
            let d2 = w2.rot.transpose() * (-dir);
            jacobians1.push(SpatialVec::new(p1.cross(&d1), d1));
            jacobians2.push(SpatialVec::new(p2.cross(&d2), d2));
        }

        Self {
            contact,
            dim,
            friction_on,
            bounce_on,
            restitution,
            friction,
            params: *params,
            jacobians1,
            jacobians2,
            applied_index: 0,
            active: false,
            applied_impulses: vec![0.0; dim],
        }
    }

    /// The geometric contact this constraint enforces.
    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    fn relative_velocity(&self, skeletons: &[Skeleton], out: &mut [f64]) {
        let skel1 = &skeletons[self.contact.skeleton1];
        let skel2 = &skeletons[self.contact.skeleton2];
        for r in 0..self.dim {
            let mut v = 0.0;
            if skel1.is_impulse_responsible() {
                v -= self.jacobians1[r].dot(&skel1.body(self.contact.body1).velocity);
            }
            if skel2.is_impulse_responsible() {
                v -= self.jacobians2[r].dot(&skel2.body(self.contact.body2).velocity);
            }
            out[r] = v;
        }
    }
}

/// Tangent basis for the friction pyramid: `t1 = normalize(first x n)`
/// with an X-axis fallback when nearly parallel, `t2` a quarter turn of
/// `t1` about the normal.
fn tangent_basis(n: &Vec3, first_dir: &Vec3) -> (Vec3, Vec3) {
    let mut t1 = first_dir.cross(n);
    if t1.norm() < CONTACT_EPSILON {
        t1 = Vec3::x().cross(n);
    }
    let t1 = t1.normalize();
    let t2 = exp_map_rot(&(n * std::f64::consts::FRAC_PI_2)) * t1;
    debug_assert!(n.dot(&t1).abs() < CONTACT_EPSILON);
    debug_assert!(n.dot(&t2).abs() < CONTACT_EPSILON);
    debug_assert!(t1.dot(&t2).abs() < CONTACT_EPSILON);
    (t1, t2)
}

impl Constraint for ContactConstraint {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn update(&mut self, skeletons: &[Skeleton]) {
        self.active = skeletons[self.contact.skeleton1].is_impulse_responsible()
            || skeletons[self.contact.skeleton2].is_impulse_responsible();
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn involved_skeletons(&self) -> (usize, Option<usize>) {
        (self.contact.skeleton1, Some(self.contact.skeleton2))
    }

    fn get_information(&mut self, skeletons: &[Skeleton], info: &mut ConstraintInfo) {
        // b starts as the negative relative velocity along each row.
        self.relative_velocity(skeletons, info.b);

        info.lo[0] = 0.0;
        info.hi[0] = f64::INFINITY;
        debug_assert_eq!(info.findex[0], -1);
        if self.friction_on {
            for r in 1..3 {
                info.lo[r] = -self.friction;
                info.hi[r] = self.friction;
                info.findex[r] = 0;
            }
        }

        // Penetration correction, capped.
        let mut bouncing_velocity = self.contact.depth - self.params.error_allowance;
        if bouncing_velocity < 0.0 {
            bouncing_velocity = 0.0;
        } else {
            bouncing_velocity *= self.params.erp * info.inv_time_step;
            bouncing_velocity =
                bouncing_velocity.min(self.params.max_error_reduction_velocity);
        }

        // Restitution takes over when it demands a faster separation.
        if self.bounce_on {
            let restitution_velocity = info.b[0] * self.restitution;
            if restitution_velocity > BOUNCE_VELOCITY_THRESHOLD
                && restitution_velocity > bouncing_velocity
            {
                bouncing_velocity = restitution_velocity.min(MAX_BOUNCE_VELOCITY);
            }
        }
        info.b[0] += bouncing_velocity;

        for r in 0..self.dim {
            info.x[r] = 0.0;
            debug_assert_eq!(info.w[r], 0.0);
        }
    }

    fn apply_unit_impulse(&mut self, skeletons: &mut [Skeleton], index: usize) {
        debug_assert!(index < self.dim);
        let s1 = self.contact.skeleton1;
        let s2 = self.contact.skeleton2;

        if s1 == s2 {
            // Self collision: both impulses propagate in one pass.
            let skel = &mut skeletons[s1];
            if skel.is_impulse_responsible() {
                skel.clear_constraint_impulses();
                skel.body_mut(self.contact.body1)
                    .add_constraint_impulse(&self.jacobians1[index]);
                skel.body_mut(self.contact.body2)
                    .add_constraint_impulse(&self.jacobians2[index]);
                skel.propagate_bias_impulses();
                skel.update_velocity_change();
                skel.set_impulse_applied(true);
            }
        } else {
            if skeletons[s1].is_impulse_responsible() {
                let skel = &mut skeletons[s1];
                skel.clear_constraint_impulses();
                skel.body_mut(self.contact.body1)
                    .add_constraint_impulse(&self.jacobians1[index]);
                skel.propagate_bias_impulses();
                skel.update_velocity_change();
                skel.set_impulse_applied(true);
            }
            if skeletons[s2].is_impulse_responsible() {
                let skel = &mut skeletons[s2];
                skel.clear_constraint_impulses();
                skel.body_mut(self.contact.body2)
                    .add_constraint_impulse(&self.jacobians2[index]);
                skel.propagate_bias_impulses();
                skel.update_velocity_change();
                skel.set_impulse_applied(true);
            }
        }
        self.applied_index = index;
    }

    fn get_velocity_change(&self, skeletons: &[Skeleton], delta_v: &mut [f64], with_cfm: bool) {
        let skel1 = &skeletons[self.contact.skeleton1];
        let skel2 = &skeletons[self.contact.skeleton2];
        for (r, dv) in delta_v.iter_mut().enumerate().take(self.dim) {
            *dv = 0.0;
            if skel1.is_impulse_applied() && skel1.is_impulse_responsible() {
                *dv += self.jacobians1[r].dot(&skel1.body(self.contact.body1).velocity_change);
            }
            if skel2.is_impulse_applied() && skel2.is_impulse_responsible() {
                *dv += self.jacobians2[r].dot(&skel2.body(self.contact.body2).velocity_change);
            }
        }
        // Diagonal softening, as in ODE's CFM.
        if with_cfm {
            delta_v[self.applied_index] += delta_v[self.applied_index] * self.params.cfm;
        }
    }

    fn unexcite(&self, skeletons: &mut [Skeleton]) {
        skeletons[self.contact.skeleton1].set_impulse_applied(false);
        skeletons[self.contact.skeleton2].set_impulse_applied(false);
    }

    fn apply_impulse(&mut self, skeletons: &mut [Skeleton], impulses: &[f64]) {
        for r in 0..self.dim {
            debug_assert!(impulses[r].is_finite());
            if skeletons[self.contact.skeleton1].is_impulse_responsible() {
                skeletons[self.contact.skeleton1]
                    .body_mut(self.contact.body1)
                    .add_constraint_impulse(&(self.jacobians1[r] * impulses[r]));
            }
            if skeletons[self.contact.skeleton2].is_impulse_responsible() {
                skeletons[self.contact.skeleton2]
                    .body_mut(self.contact.body2)
                    .add_constraint_impulse(&(self.jacobians2[r] * impulses[r]));
            }
            self.applied_impulses[r] = impulses[r];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tangent_basis_is_orthonormal() {
        let n = Vec3::new(0.3, -0.5, 0.8).normalize();
        let (t1, t2) = tangent_basis(&n, &Vec3::z());
        assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
        assert!(t1.dot(&n).abs() < CONTACT_EPSILON);
        assert!(t2.dot(&n).abs() < CONTACT_EPSILON);
        assert!(t1.dot(&t2).abs() < CONTACT_EPSILON);
    }

    #[test]
    fn tangent_basis_degenerate_seed() {
        // Seed parallel to the normal falls back to the X axis.
        let n = Vec3::z();
        let (t1, t2) = tangent_basis(&n, &Vec3::z());
        assert!(t1.dot(&n).abs() < CONTACT_EPSILON);
        assert!(t2.dot(&n).abs() < CONTACT_EPSILON);
    }
}
