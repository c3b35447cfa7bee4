//! Recursive dynamics algorithms over the skeleton tree.
//!
//! Mass matrix by the composite-rigid-body algorithm, inverse mass matrix
//! by column-wise articulated-body probes, bias forces by inverse dynamics
//! with zero acceleration, forward dynamics both as
//! `a = M^-1 (tau - C v - g + ...)` and as the O(n) articulated-body
//! recursion, and the impulse pipeline used by the constraint solver.

use crate::error::{DynamicsError, Result};
use crate::skeleton::Skeleton;
use arbor_math::{transform_inertia, DMat, DVec, SpatialVec, Vec3};

impl Skeleton {
    // -- generalized force vectors -----------------------------------------

    /// Implicit spring forces `-k (q + v dt - q0)` per DOF.
    pub fn spring_force_vector(&self, dt: f64) -> DVec {
        DVec::from_iterator(
            self.ndofs,
            self.dof_map
                .iter()
                .map(|&(j, l)| self.joints[j].gencoords[l].spring_force(dt)),
        )
    }

    /// Damping forces `-d v` per DOF.
    pub fn damping_force_vector(&self) -> DVec {
        DVec::from_iterator(
            self.ndofs,
            self.dof_map
                .iter()
                .map(|&(j, l)| self.joints[j].gencoords[l].damping_force()),
        )
    }

    /// Generalized external forces `J^T F_ext` accumulated over bodies.
    pub fn external_force_vector(&mut self) -> DVec {
        self.ensure_kinematics();
        let nb = self.bodies.len();
        let mut wrench: Vec<SpatialVec> = self.bodies.iter().map(|b| b.external_force).collect();
        let mut gen = DVec::zeros(self.ndofs);
        for i in (0..nb).rev() {
            let n = self.joints[i].num_dofs();
            if n > 0 {
                let vals = self.joints[i].jacobian.transpose() * wrench[i].data;
                let off = self.offsets[i];
                for k in 0..n {
                    gen[off + k] = vals[k];
                }
            }
            if let Some(p) = self.bodies[i].parent {
                let moved = self.joints[i].transform.dad_inv(&wrench[i]);
                wrench[p] = wrench[p] + moved;
            }
        }
        gen
    }

    /// Generalized constraint forces from the last impulse solve:
    /// `F_c = M dv_impulse / dt`.
    pub fn constraint_force_vector(&mut self) -> DVec {
        let dv = self.impulse_vel_change.clone();
        let dt = self.time_step;
        let m = self.mass_matrix();
        (m * dv) / dt
    }

    // -- inverse dynamics and bias vectors ---------------------------------

    /// Recursive inverse dynamics: the generalized forces that produce
    /// `accels` (zero when `None`) at the current positions, including
    /// gravity and, when `with_velocities`, Coriolis terms.
    fn inverse_dynamics(&mut self, accels: Option<&DVec>, with_velocities: bool) -> DVec {
        self.ensure_kinematics();
        let nb = self.bodies.len();
        let g = self.gravity;

        let mut vel = vec![SpatialVec::zero(); nb];
        let mut acc = vec![SpatialVec::zero(); nb];
        let mut force = vec![SpatialVec::zero(); nb];

        for i in 0..nb {
            let joint = &self.joints[i];
            let n = joint.num_dofs();
            let off = self.offsets[i];
            let t = joint.transform;
            let parent = self.bodies[i].parent;

            let qd = if with_velocities {
                joint.velocities()
            } else {
                DVec::zeros(n)
            };
            let qdd = match accels {
                Some(a) => a.rows(off, n).into_owned(),
                None => DVec::zeros(n),
            };

            let s_qd = SpatialVec::from_vec6(&joint.jacobian * &qd);
            let ds_qd = SpatialVec::from_vec6(&joint.jacobian_dot * &qd);
            let s_qdd = SpatialVec::from_vec6(&joint.jacobian * &qdd);

            let (v_par, a_par) = match parent {
                Some(p) => (t.ad_inv(&vel[p]), t.ad_inv(&acc[p])),
                None => (SpatialVec::zero(), SpatialVec::zero()),
            };
            vel[i] = v_par + s_qd;
            acc[i] = a_par + vel[i].cross_motion(&s_qd) + ds_qd + s_qdd;
        }

        let mut tau = DVec::zeros(self.ndofs);
        for i in (0..nb).rev() {
            let body = &self.bodies[i];
            let inertia = body.spatial_inertia;
            let rt = body.world_transform.rot.transpose();
            let gravity_wrench =
                SpatialVec::from_vec6(inertia * SpatialVec::new(Vec3::zeros(), rt * g).data);

            let own = SpatialVec::from_vec6(inertia * acc[i].data)
                + vel[i].cross_force(&SpatialVec::from_vec6(inertia * vel[i].data))
                - gravity_wrench;
            force[i] = force[i] + own;

            let joint = &self.joints[i];
            let n = joint.num_dofs();
            if n > 0 {
                let vals = joint.jacobian.transpose() * force[i].data;
                let off = self.offsets[i];
                for k in 0..n {
                    tau[off + k] = vals[k];
                }
            }
            if let Some(p) = body.parent {
                let moved = joint.transform.dad_inv(&force[i]);
                force[p] = force[p] + moved;
            }
        }
        tau
    }

    /// Gravity bias `g(q)` (cached).
    pub fn gravity_force_vector(&mut self) -> &DVec {
        if self.cache.dirty_gravity {
            self.cache.gravity = self.inverse_dynamics(None, false);
            self.cache.dirty_gravity = false;
        }
        &self.cache.gravity
    }

    /// Combined bias `C(q, v) v + g(q)` (cached).
    pub fn combined_vector(&mut self) -> &DVec {
        if self.cache.dirty_combined {
            self.cache.combined = self.inverse_dynamics(None, true);
            self.cache.dirty_combined = false;
        }
        &self.cache.combined
    }

    /// Coriolis bias `C(q, v) v` (cached).
    pub fn coriolis_vector(&mut self) -> &DVec {
        if self.cache.dirty_coriolis {
            let combined = self.inverse_dynamics(None, true);
            let gravity = self.inverse_dynamics(None, false);
            self.cache.coriolis = combined - gravity;
            self.cache.dirty_coriolis = false;
        }
        &self.cache.coriolis
    }

    // -- mass matrices -----------------------------------------------------

    /// Joint-space mass matrix `M(q)` by the composite-rigid-body
    /// algorithm (cached).
    pub fn mass_matrix(&mut self) -> &DMat {
        if !self.cache.dirty_mass {
            return &self.cache.mass;
        }
        self.ensure_kinematics();
        let nb = self.bodies.len();
        let mut m = DMat::zeros(self.ndofs, self.ndofs);

        // Composite inertias accumulate child-to-parent.
        let mut ic: Vec<_> = self.bodies.iter().map(|b| b.spatial_inertia).collect();
        for i in (0..nb).rev() {
            if let Some(p) = self.bodies[i].parent {
                let contribution = transform_inertia(&self.joints[i].transform, &ic[i]);
                ic[p] += contribution;
            }
        }

        for i in 0..nb {
            let n_i = self.joints[i].num_dofs();
            if n_i == 0 {
                continue;
            }
            let off_i = self.offsets[i];
            let f = ic[i] * &self.joints[i].jacobian;
            let block = self.joints[i].jacobian.transpose() * &f;
            m.view_mut((off_i, off_i), (n_i, n_i)).copy_from(&block);

            // Off-diagonal blocks: push the composite force up the chain.
            let mut cols: Vec<SpatialVec> = (0..n_i)
                .map(|c| SpatialVec::from_vec6(f.column(c).into_owned()))
                .collect();
            let mut cur = i;
            while let Some(p) = self.bodies[cur].parent {
                let t = self.joints[cur].transform;
                for c in cols.iter_mut() {
                    *c = t.dad_inv(c);
                }
                let n_j = self.joints[p].num_dofs();
                if n_j > 0 {
                    let off_j = self.offsets[p];
                    for (ci, c) in cols.iter().enumerate() {
                        let vals = self.joints[p].jacobian.transpose() * c.data;
                        for k in 0..n_j {
                            m[(off_i + ci, off_j + k)] = vals[k];
                            m[(off_j + k, off_i + ci)] = vals[k];
                        }
                    }
                }
                cur = p;
            }
        }

        self.cache.mass = m;
        self.cache.dirty_mass = false;
        &self.cache.mass
    }

    /// Inverse mass matrix by unit-force articulated-body probes, one
    /// column per DOF (cached). Cheaper than a dense inversion on sparse
    /// trees.
    pub fn inv_mass_matrix(&mut self) -> &DMat {
        if !self.cache.dirty_inv_mass {
            return &self.cache.inv_mass;
        }
        self.ensure_kinematics();
        let nb = self.bodies.len();

        // Articulated inertias without velocity or spring terms.
        let mut ia: Vec<_> = self.bodies.iter().map(|b| b.spatial_inertia).collect();
        let mut ai_s = Vec::with_capacity(nb);
        let mut psi = Vec::with_capacity(nb);
        for i in (0..nb).rev() {
            let n = self.joints[i].num_dofs();
            let (s, p, pi_mat) = if n > 0 {
                let jac = &self.joints[i].jacobian;
                let s = ia[i] * jac;
                let omega = jac.transpose() * &s;
                let p = omega.try_inverse().unwrap_or_else(|| {
                    log::warn!("singular joint-space inertia at '{}'", self.joints[i].name);
                    DMat::zeros(n, n)
                });
                let pi_mat = ia[i] - &s * &p * s.transpose();
                (s, p, pi_mat)
            } else {
                (arbor_math::Jacobian::zeros(0), DMat::zeros(0, 0), ia[i])
            };
            if let Some(parent) = self.bodies[i].parent {
                ia[parent] += transform_inertia(&self.joints[i].transform, &pi_mat);
            }
            ai_s.push(s);
            psi.push(p);
        }
        ai_s.reverse();
        psi.reverse();

        let mut minv = DMat::zeros(self.ndofs, self.ndofs);
        for col in 0..self.ndofs {
            let mut bias = vec![SpatialVec::zero(); nb];
            let mut alpha: Vec<DVec> = vec![DVec::zeros(0); nb];
            for i in (0..nb).rev() {
                let n = self.joints[i].num_dofs();
                let beta = if n > 0 {
                    let off = self.offsets[i];
                    let mut tau = DVec::zeros(n);
                    if col >= off && col < off + n {
                        tau[col - off] = 1.0;
                    }
                    let a = tau - self.joints[i].jacobian.transpose() * bias[i].data;
                    let beta = bias[i] + SpatialVec::from_vec6(&ai_s[i] * (&psi[i] * &a));
                    alpha[i] = a;
                    beta
                } else {
                    bias[i]
                };
                if let Some(p) = self.bodies[i].parent {
                    bias[p] = bias[p] + self.joints[i].transform.dad_inv(&beta);
                }
            }

            let mut acc = vec![SpatialVec::zero(); nb];
            for i in 0..nb {
                let a_par = match self.bodies[i].parent {
                    Some(p) => self.joints[i].transform.ad_inv(&acc[p]),
                    None => SpatialVec::zero(),
                };
                let n = self.joints[i].num_dofs();
                if n > 0 {
                    let qdd = &psi[i] * (&alpha[i] - ai_s[i].transpose() * a_par.data);
                    let off = self.offsets[i];
                    for k in 0..n {
                        minv[(off + k, col)] = qdd[k];
                    }
                    acc[i] = a_par + SpatialVec::from_vec6(&self.joints[i].jacobian * &qdd);
                } else {
                    acc[i] = a_par;
                }
            }
        }

        self.cache.inv_mass = minv;
        self.cache.dirty_inv_mass = false;
        &self.cache.inv_mass
    }

    // -- forward dynamics --------------------------------------------------

    /// Forward dynamics through the inverse mass matrix:
    /// `a = M^-1 (tau + tau_spring + tau_damp + F_ext - C v - g)`.
    ///
    /// Must agree with [`Skeleton::forward_dynamics`] when no springs or
    /// dampers are present (the articulated pass treats those implicitly).
    pub fn forward_dynamics_id(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(DynamicsError::NotInitialized(self.name.clone()));
        }
        let dt = self.time_step;
        let rhs = self.forces() + self.spring_force_vector(dt) + self.damping_force_vector()
            + self.external_force_vector()
            - self.combined_vector().clone();
        let a = self.inv_mass_matrix() * rhs;
        for (k, &(j, l)) in self.dof_map.iter().enumerate() {
            self.joints[j].gencoords[l].a = a[k];
        }
        self.compute_forward_kinematics(false, false, true);
        self.check_finite()
    }

    /// Featherstone articulated-body forward dynamics, O(n).
    ///
    /// Computes joint and body accelerations from the current state,
    /// actuation forces, external wrenches, gravity, and implicit
    /// spring/damper terms. Leaves the articulated inertia factorization
    /// in place for the impulse pipeline.
    pub fn forward_dynamics(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(DynamicsError::NotInitialized(self.name.clone()));
        }
        self.ensure_kinematics();
        let nb = self.bodies.len();
        let dt = self.time_step;
        let g = self.gravity;

        // Leaf-ward state: rigid inertia and bias force.
        for body in &mut self.bodies {
            let rt = body.world_transform.rot.transpose();
            body.gravity_force = SpatialVec::from_vec6(
                body.spatial_inertia * SpatialVec::new(Vec3::zeros(), rt * g).data,
            );
            body.art_inertia = body.spatial_inertia;
            let iv = SpatialVec::from_vec6(body.spatial_inertia * body.velocity.data);
            body.bias_force =
                body.velocity.cross_force(&iv) - body.external_force - body.gravity_force;
        }

        // Inward pass: articulated inertias and bias forces.
        for i in (0..nb).rev() {
            let n = self.joints[i].num_dofs();
            let t = self.joints[i].transform;
            let parent = self.bodies[i].parent;
            let ia = self.bodies[i].art_inertia;
            let bias = self.bodies[i].bias_force;
            let eta = self.bodies[i].partial_acceleration;

            let (pi_mat, beta) = if n > 0 {
                let joint = &self.joints[i];
                let ai_s = ia * &joint.jacobian;
                let omega = joint.jacobian.transpose() * &ai_s;
                let mut implicit_omega = omega.clone();
                for (k, gc) in joint.gencoords.iter().enumerate() {
                    implicit_omega[(k, k)] += dt * gc.damping + dt * dt * gc.spring_stiffness;
                }
                let psi = omega
                    .try_inverse()
                    .ok_or_else(|| DynamicsError::SingularInertia(joint.name.clone()))?;
                let implicit_psi = implicit_omega
                    .try_inverse()
                    .ok_or_else(|| DynamicsError::SingularInertia(joint.name.clone()))?;

                let tau = DVec::from_iterator(
                    n,
                    joint
                        .gencoords
                        .iter()
                        .map(|gc| gc.force + gc.spring_force(dt) + gc.damping_force()),
                );
                let ia_eta_bias = SpatialVec::from_vec6(ia * eta.data) + bias;
                let alpha = tau - joint.jacobian.transpose() * ia_eta_bias.data;

                let pi_mat = ia - &ai_s * &implicit_psi * ai_s.transpose();
                let beta =
                    ia_eta_bias + SpatialVec::from_vec6(&ai_s * (&implicit_psi * &alpha));

                let sc = &mut self.scratch[i];
                sc.ai_s = ai_s;
                sc.psi = psi;
                sc.implicit_psi = implicit_psi;
                sc.alpha = alpha;
                (pi_mat, beta)
            } else {
                (ia, bias + SpatialVec::from_vec6(ia * eta.data))
            };

            if let Some(p) = parent {
                self.bodies[p].art_inertia += transform_inertia(&t, &pi_mat);
                self.bodies[p].bias_force = self.bodies[p].bias_force + t.dad_inv(&beta);
            }
        }

        // Outward pass: joint and body accelerations.
        for i in 0..nb {
            let t = self.joints[i].transform;
            let a_par = match self.bodies[i].parent {
                Some(p) => t.ad_inv(&self.bodies[p].acceleration),
                None => SpatialVec::zero(),
            };
            let eta = self.bodies[i].partial_acceleration;
            let n = self.joints[i].num_dofs();
            if n > 0 {
                let sc = &self.scratch[i];
                let qdd = &sc.implicit_psi * (&sc.alpha - sc.ai_s.transpose() * a_par.data);
                for (k, gc) in self.joints[i].gencoords.iter_mut().enumerate() {
                    gc.a = qdd[k];
                }
                let s_qdd = SpatialVec::from_vec6(&self.joints[i].jacobian * &qdd);
                self.bodies[i].acceleration = a_par + eta + s_qdd;
            } else {
                self.bodies[i].acceleration = a_par + eta;
            }
        }

        self.check_finite()
    }

    // -- impulse pipeline --------------------------------------------------

    /// Clear per-body and per-joint constraint impulse accumulators.
    pub fn clear_constraint_impulses(&mut self) {
        for body in &mut self.bodies {
            body.constraint_impulse = SpatialVec::zero();
        }
        for joint in &mut self.joints {
            for gc in &mut joint.gencoords {
                gc.constraint_impulse = 0.0;
            }
        }
    }

    /// Reset solver bookkeeping at the start of a step.
    pub fn reset_constraint_state(&mut self) {
        self.clear_constraint_impulses();
        self.impulse_vel_change.fill(0.0);
        self.impulse_applied = false;
    }

    /// Set a joint-space constraint impulse on one DOF (joint limits).
    pub fn set_joint_constraint_impulse(&mut self, joint_idx: usize, dof: usize, value: f64) {
        self.joints[joint_idx].gencoords[dof].constraint_impulse = value;
    }

    pub fn set_impulse_applied(&mut self, applied: bool) {
        self.impulse_applied = applied;
    }

    pub fn is_impulse_applied(&self) -> bool {
        self.impulse_applied
    }

    /// Inward pass over the accumulated constraint impulses.
    ///
    /// Reuses the articulated inertia factorization of the last
    /// [`Skeleton::forward_dynamics`] call; the solver runs right after it
    /// within the same step, so the factorization is current.
    pub fn propagate_bias_impulses(&mut self) {
        let nb = self.bodies.len();
        for body in &mut self.bodies {
            body.bias_impulse = -body.constraint_impulse;
        }
        for i in (0..nb).rev() {
            let n = self.joints[i].num_dofs();
            let b = self.bodies[i].bias_impulse;
            let beta = if n > 0 {
                let joint = &self.joints[i];
                let tau_imp = DVec::from_iterator(
                    n,
                    joint.gencoords.iter().map(|gc| gc.constraint_impulse),
                );
                let imp_alpha = tau_imp - joint.jacobian.transpose() * b.data;
                let sc = &self.scratch[i];
                let beta = b + SpatialVec::from_vec6(&sc.ai_s * (&sc.psi * &imp_alpha));
                self.scratch[i].imp_alpha = imp_alpha;
                beta
            } else {
                b
            };
            if let Some(p) = self.bodies[i].parent {
                let moved = self.joints[i].transform.dad_inv(&beta);
                self.bodies[p].bias_impulse = self.bodies[p].bias_impulse + moved;
            }
        }
    }

    /// Outward pass: velocity changes produced by the propagated impulses.
    pub fn update_velocity_change(&mut self) {
        let nb = self.bodies.len();
        for i in 0..nb {
            let t = self.joints[i].transform;
            let dv_par = match self.bodies[i].parent {
                Some(p) => t.ad_inv(&self.bodies[p].velocity_change),
                None => SpatialVec::zero(),
            };
            let n = self.joints[i].num_dofs();
            if n > 0 {
                let sc = &self.scratch[i];
                let del_qd = &sc.psi * (&sc.imp_alpha - sc.ai_s.transpose() * dv_par.data);
                for (k, gc) in self.joints[i].gencoords.iter_mut().enumerate() {
                    gc.vel_change = del_qd[k];
                }
                let s_dqd = SpatialVec::from_vec6(&self.joints[i].jacobian * &del_qd);
                self.bodies[i].velocity_change = dv_par + s_dqd;
            } else {
                self.bodies[i].velocity_change = dv_par;
            }
        }
    }

    /// Apply the accumulated constraint impulses: propagate, update the
    /// generalized velocities, and record the velocity change for the
    /// constraint-force report.
    pub fn compute_impulse_forward_dynamics(&mut self) {
        self.propagate_bias_impulses();
        self.update_velocity_change();
        for (k, &(j, l)) in self.dof_map.iter().enumerate() {
            let dv = self.joints[j].gencoords[l].vel_change;
            self.joints[j].gencoords[l].v += dv;
            self.impulse_vel_change[k] += dv;
        }
        self.cache.dirty_kinematics = true;
        self.cache.dirty_coriolis = true;
        self.cache.dirty_combined = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyNode;
    use crate::joint::Joint;
    use approx::assert_relative_eq;
    use arbor_math::{SpatialInertia, Transform, GRAVITY};

    fn rod_inertia(mass: f64, length: f64) -> SpatialInertia {
        SpatialInertia::new(
            mass,
            Vec3::new(0.0, -length / 2.0, 0.0),
            arbor_math::Mat3::from_diagonal(&Vec3::new(
                mass * length * length / 12.0,
                0.0,
                mass * length * length / 12.0,
            )),
        )
    }

    /// Pendulum swinging in the XY plane about the world Z axis.
    fn make_pendulum() -> Skeleton {
        let mut skel = Skeleton::new("pendulum");
        skel.add_body(
            None,
            Joint::revolute("hinge", Vec3::z()),
            BodyNode::new("link", rod_inertia(1.0, 1.0)),
        );
        skel.init(1e-3, Vec3::new(0.0, -GRAVITY, 0.0)).unwrap();
        skel
    }

    fn make_double_pendulum() -> Skeleton {
        let mut skel = Skeleton::new("double");
        let link1 = skel.add_body(
            None,
            Joint::revolute("hinge1", Vec3::z()),
            BodyNode::new("link1", rod_inertia(1.0, 1.0)),
        );
        skel.add_body(
            Some(link1),
            Joint::revolute("hinge2", Vec3::z())
                .with_parent_to_joint(Transform::from_translation(Vec3::new(0.0, -1.0, 0.0))),
            BodyNode::new("link2", rod_inertia(1.0, 1.0)),
        );
        skel.init(1e-3, Vec3::new(0.0, -GRAVITY, 0.0)).unwrap();
        skel
    }

    #[test]
    fn pendulum_equilibrium_at_rest() {
        let mut skel = make_pendulum();
        skel.forward_dynamics().unwrap();
        assert_relative_eq!(skel.accelerations()[0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn pendulum_horizontal_release() {
        let mut skel = make_pendulum();
        // Rotate the rod from hanging (-y) to horizontal (-x).
        skel.set_positions(&DVec::from_element(1, -std::f64::consts::FRAC_PI_2));
        skel.forward_dynamics().unwrap();
        // Gravity swings it back toward hanging:
        // |a| = (m g l / 2) / (m l^2 / 3) = 3 g / 2 for a uniform rod.
        let expected = 1.5 * GRAVITY;
        assert_relative_eq!(skel.accelerations()[0], expected, epsilon = 1e-9);
    }

    #[test]
    fn forward_dynamics_paths_agree() {
        let mut skel = make_double_pendulum();
        skel.set_positions(&DVec::from_vec(vec![0.3, -0.2]));
        skel.set_velocities(&DVec::from_vec(vec![0.5, 1.1]));
        skel.set_forces(&DVec::from_vec(vec![0.2, -0.4]));

        skel.forward_dynamics().unwrap();
        let a_fs = skel.accelerations();
        skel.forward_dynamics_id().unwrap();
        let a_id = skel.accelerations();

        assert_relative_eq!(a_fs, a_id, epsilon = 1e-9);
    }

    #[test]
    fn forward_dynamics_paths_agree_on_mixed_tree() {
        use crate::joint::{EulerConvention, PlaneType};

        // A 30-DOF tree covering every joint kind.
        let mut skel = Skeleton::new("mixed");
        let inertia = || SpatialInertia::new(
            0.8,
            Vec3::new(0.02, -0.1, 0.05),
            arbor_math::Mat3::from_diagonal(&Vec3::new(0.02, 0.015, 0.025)),
        );
        let step = Transform::from_translation(Vec3::new(0.0, -0.3, 0.05));
        let add = |skel: &mut Skeleton, parent, joint: Joint| {
            skel.add_body(
                parent,
                joint.with_parent_to_joint(step),
                BodyNode::new("link", inertia()),
            )
        };
        let b0 = add(&mut skel, None, Joint::free("j0"));
        let b1 = add(&mut skel, Some(b0), Joint::ball("j1"));
        let b2 = add(&mut skel, Some(b1), Joint::universal("j2", Vec3::x(), Vec3::z()));
        let b3 = add(&mut skel, Some(b2), Joint::revolute("j3", Vec3::y()));
        let b4 = add(&mut skel, Some(b3), Joint::prismatic("j4", Vec3::z()));
        let b5 = add(&mut skel, Some(b4), Joint::euler("j5", EulerConvention::Xyz));
        let b6 = add(&mut skel, Some(b5), Joint::planar("j6", PlaneType::Zx));
        let b7 = add(&mut skel, Some(b6), Joint::translational("j7"));
        let b8 = add(&mut skel, Some(b7), Joint::screw("j8", Vec3::x(), 0.05));
        let b9 = add(&mut skel, Some(b8), Joint::euler("j9", EulerConvention::Zyx));
        let b10 = add(&mut skel, Some(b9), Joint::universal("j10", Vec3::y(), Vec3::z()));
        let b11 = add(&mut skel, Some(b10), Joint::revolute("j11", Vec3::x()));
        let _ = add(&mut skel, Some(b11), Joint::revolute("j12", Vec3::z()));
        skel.init(1e-3, Vec3::new(0.0, -GRAVITY, 0.0)).unwrap();
        assert_eq!(skel.num_dofs(), 30);

        let n = skel.num_dofs();
        skel.set_positions(&DVec::from_fn(n, |k, _| 0.1 * ((k % 7) as f64 - 3.0)));
        skel.set_velocities(&DVec::from_fn(n, |k, _| 0.2 * ((k % 5) as f64 - 2.0)));
        skel.set_forces(&DVec::from_fn(n, |k, _| 0.3 * ((k % 3) as f64 - 1.0)));

        skel.forward_dynamics().unwrap();
        let a_fs = skel.accelerations();
        skel.forward_dynamics_id().unwrap();
        let a_id = skel.accelerations();

        let scale = a_fs.norm().max(1.0);
        assert!(
            (&a_fs - &a_id).norm() < 1e-9 * scale,
            "paths diverge: |diff| = {}",
            (&a_fs - &a_id).norm()
        );
    }

    #[test]
    fn newton_euler_residual_vanishes() {
        // M a + C v + g must equal the applied generalized force.
        let mut skel = make_double_pendulum();
        skel.set_positions(&DVec::from_vec(vec![0.7, 0.4]));
        skel.set_velocities(&DVec::from_vec(vec![-0.3, 0.9]));
        skel.set_forces(&DVec::from_vec(vec![1.0, -2.0]));
        skel.forward_dynamics().unwrap();

        let a = skel.accelerations();
        let m = skel.mass_matrix().clone();
        let cg = skel.combined_vector().clone();
        let residual = m * a + cg - skel.forces();
        assert!(residual.norm() < 1e-8, "residual = {residual}");
    }

    #[test]
    fn mass_matrix_inverse_consistent() {
        let mut skel = make_double_pendulum();
        skel.set_positions(&DVec::from_vec(vec![0.4, -0.9]));
        let m = skel.mass_matrix().clone();
        let minv = skel.inv_mass_matrix().clone();
        let id = &m * &minv;
        assert_relative_eq!(id, DMat::identity(2, 2), epsilon = 1e-9);
    }

    #[test]
    fn external_force_projects_through_jacobian() {
        let mut skel = make_pendulum();
        // Rod horizontal along -x; push the tip downward in world frame.
        skel.set_positions(&DVec::from_element(1, -std::f64::consts::FRAC_PI_2));
        skel.ensure_kinematics();
        let w = skel.body(0).world_transform;
        let tip_world = w.transform_point(&Vec3::new(0.0, -1.0, 0.0));
        skel.body_mut(0)
            .add_external_force(&Vec3::new(0.0, -1.0, 0.0), &tip_world, false, false);
        let f = skel.external_force_vector();
        // Unit force at unit lever arm, swinging back toward hanging.
        assert_relative_eq!(f[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn unit_impulse_changes_velocity_by_inverse_mass() {
        let mut skel = make_pendulum();
        skel.forward_dynamics().unwrap();

        skel.clear_constraint_impulses();
        skel.set_joint_constraint_impulse(0, 0, 1.0);
        skel.propagate_bias_impulses();
        skel.update_velocity_change();

        let minv = skel.inv_mass_matrix().clone();
        assert_relative_eq!(
            skel.gencoord(0).vel_change,
            minv[(0, 0)],
            epsilon = 1e-10
        );
    }

    #[test]
    fn ball_chain_stays_finite() {
        let mut skel = Skeleton::new("chain");
        let mut parent = None;
        for i in 0..4 {
            let joint = if parent.is_some() {
                Joint::ball(&format!("ball{i}"))
                    .with_parent_to_joint(Transform::from_translation(Vec3::new(0.0, -0.5, 0.0)))
            } else {
                Joint::ball(&format!("ball{i}"))
            };
            let idx = skel.add_body(parent, joint, BodyNode::new(&format!("link{i}"), rod_inertia(0.5, 0.5)));
            parent = Some(idx);
        }
        skel.init(1e-3, Vec3::new(0.0, -GRAVITY, 0.0)).unwrap();
        skel.set_velocities(&DVec::from_fn(12, |k, _| 0.1 * (k as f64 + 1.0)));

        for _ in 0..200 {
            skel.forward_dynamics().unwrap();
            skel.integrate_velocities(1e-3);
            skel.integrate_positions(1e-3);
        }
        assert!(skel.check_finite().is_ok());
    }
}
