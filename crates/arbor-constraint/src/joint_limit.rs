//! Joint position-limit constraints.

use crate::constraint::{Constraint, ConstraintInfo, ContactParams};
use arbor_dynamics::Skeleton;

/// Enforces the position limits of one joint through unilateral impulse
/// rows, one per violated DOF.
pub struct JointLimitConstraint {
    skeleton: usize,
    joint: usize,
    params: ContactParams,
    /// Local DOF index of each active row.
    active_dofs: Vec<usize>,
    /// Signed limit violation per active row (negative below the lower
    /// limit, positive above the upper).
    violations: Vec<f64>,
    applied_index: usize,
    /// Impulses committed by the last solve.
    pub applied_impulses: Vec<f64>,
}

impl JointLimitConstraint {
    /// `joint` is the joint index, which is also the index of its child
    /// body in the skeleton.
    pub fn new(skeleton: usize, joint: usize, params: &ContactParams) -> Self {
        Self {
            skeleton,
            joint,
            params: *params,
            active_dofs: Vec::new(),
            violations: Vec::new(),
            applied_index: 0,
            applied_impulses: Vec::new(),
        }
    }
}

impl Constraint for JointLimitConstraint {
    fn dimension(&self) -> usize {
        self.active_dofs.len()
    }

    fn update(&mut self, skeletons: &[Skeleton]) {
        self.active_dofs.clear();
        self.violations.clear();
        let skel = &skeletons[self.skeleton];
        if !skel.is_impulse_responsible() {
            return;
        }
        let joint = skel.joint(self.joint);
        if !joint.position_limited {
            return;
        }
        for (l, gc) in joint.gencoords.iter().enumerate() {
            if gc.q < gc.q_min {
                self.active_dofs.push(l);
                self.violations.push(gc.q - gc.q_min);
            } else if gc.q > gc.q_max {
                self.active_dofs.push(l);
                self.violations.push(gc.q - gc.q_max);
            }
        }
        self.applied_impulses = vec![0.0; self.active_dofs.len()];
    }

    fn is_active(&self) -> bool {
        !self.active_dofs.is_empty()
    }

    fn involved_skeletons(&self) -> (usize, Option<usize>) {
        (self.skeleton, None)
    }

    fn get_information(&mut self, skeletons: &[Skeleton], info: &mut ConstraintInfo) {
        let joint = skeletons[self.skeleton].joint(self.joint);
        for (r, (&dof, &violation)) in self
            .active_dofs
            .iter()
            .zip(self.violations.iter())
            .enumerate()
        {
            let gc = &joint.gencoords[dof];

            // Error reduction pushes back toward the violated limit.
            let mut correction = violation.abs() - self.params.error_allowance;
            if correction < 0.0 {
                correction = 0.0;
            } else {
                correction *= self.params.erp * info.inv_time_step;
                correction = correction.min(self.params.max_error_reduction_velocity);
            }

            info.b[r] = -gc.v - correction.copysign(violation);
            if violation < 0.0 {
                // Below the lower limit: only push up.
                info.lo[r] = 0.0;
                info.hi[r] = f64::INFINITY;
            } else {
                info.lo[r] = f64::NEG_INFINITY;
                info.hi[r] = 0.0;
            }
            info.findex[r] = -1;
            info.x[r] = 0.0;
        }
    }

    fn apply_unit_impulse(&mut self, skeletons: &mut [Skeleton], index: usize) {
        let dof = self.active_dofs[index];
        let skel = &mut skeletons[self.skeleton];
        skel.clear_constraint_impulses();
        skel.set_joint_constraint_impulse(self.joint, dof, 1.0);
        skel.propagate_bias_impulses();
        skel.update_velocity_change();
        skel.set_joint_constraint_impulse(self.joint, dof, 0.0);
        skel.set_impulse_applied(true);
        self.applied_index = index;
    }

    fn get_velocity_change(&self, skeletons: &[Skeleton], delta_v: &mut [f64], with_cfm: bool) {
        let skel = &skeletons[self.skeleton];
        let joint = skel.joint(self.joint);
        for (r, &dof) in self.active_dofs.iter().enumerate() {
            delta_v[r] = if skel.is_impulse_applied() {
                joint.gencoords[dof].vel_change
            } else {
                0.0
            };
        }
        if with_cfm {
            delta_v[self.applied_index] += delta_v[self.applied_index] * self.params.cfm;
        }
    }

    fn unexcite(&self, skeletons: &mut [Skeleton]) {
        skeletons[self.skeleton].set_impulse_applied(false);
    }

    fn apply_impulse(&mut self, skeletons: &mut [Skeleton], impulses: &[f64]) {
        let skel = &mut skeletons[self.skeleton];
        for (r, &dof) in self.active_dofs.iter().enumerate() {
            let current = skel.joint(self.joint).gencoords[dof].constraint_impulse;
            skel.set_joint_constraint_impulse(self.joint, dof, current + impulses[r]);
            self.applied_impulses[r] = impulses[r];
        }
    }
}
