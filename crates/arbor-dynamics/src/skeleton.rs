//! Skeleton: a forest-aware container of body nodes and joints.
//!
//! Bodies live in a flat vector in assembly (BFS) order, so every parent
//! precedes all of its descendants; joints[i] connects bodies[i] to its
//! parent (or to the world for roots). Skeleton-level matrices are cached
//! behind dirty flags and recomputed lazily.

use crate::body::BodyNode;
use crate::error::{DynamicsError, Result};
use crate::gencoord::GenCoord;
use crate::joint::Joint;
use arbor_math::{DMat, DVec, Jacobian, SpatialVec, Vec3};

/// Per-joint scratch for the articulated-inertia pipeline, allocated once
/// at init and reused across steps.
#[derive(Debug, Clone)]
pub(crate) struct JointScratch {
    /// `IA * S`, 6 x ndof.
    pub ai_s: Jacobian,
    /// `(S^T IA S)^-1`.
    pub psi: DMat,
    /// Like `psi` with the implicit spring/damper diagonal added.
    pub implicit_psi: DMat,
    /// Force-pass partial solution.
    pub alpha: DVec,
    /// Impulse-pass partial solution.
    pub imp_alpha: DVec,
}

#[derive(Debug, Clone)]
pub(crate) struct Caches {
    pub mass: DMat,
    pub inv_mass: DMat,
    pub coriolis: DVec,
    pub gravity: DVec,
    pub combined: DVec,
    pub dirty_kinematics: bool,
    pub dirty_mass: bool,
    pub dirty_inv_mass: bool,
    pub dirty_coriolis: bool,
    pub dirty_gravity: bool,
    pub dirty_combined: bool,
}

impl Default for Caches {
    fn default() -> Self {
        Self {
            mass: DMat::zeros(0, 0),
            inv_mass: DMat::zeros(0, 0),
            coriolis: DVec::zeros(0),
            gravity: DVec::zeros(0),
            combined: DVec::zeros(0),
            dirty_kinematics: true,
            dirty_mass: true,
            dirty_inv_mass: true,
            dirty_coriolis: true,
            dirty_gravity: true,
            dirty_combined: true,
        }
    }
}

/// An articulated skeleton: a tree of rigid bodies connected by joints.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub name: String,
    pub(crate) bodies: Vec<BodyNode>,
    pub(crate) joints: Vec<Joint>,
    /// DOF offset of each joint in the flattened registry.
    pub(crate) offsets: Vec<usize>,
    /// Flattened DOF index -> (joint index, local DOF index).
    pub(crate) dof_map: Vec<(usize, usize)>,
    pub(crate) ndofs: usize,

    /// Immobile skeletons are static environment geometry: they never
    /// receive impulses or integrate.
    pub mobile: bool,
    /// Whether bodies of this skeleton collide with each other.
    pub self_collision: bool,

    pub(crate) time_step: f64,
    pub(crate) gravity: Vec3,
    pub(crate) initialized: bool,

    pub(crate) scratch: Vec<JointScratch>,
    pub(crate) cache: Caches,

    /// Generalized velocity change applied by the last constraint solve.
    pub(crate) impulse_vel_change: DVec,
    /// Set while a probe impulse is in flight during the LCP assembly.
    pub(crate) impulse_applied: bool,

    /// Union-find root (index into the world's skeleton list).
    pub union_root: usize,
    /// Union-find tree size.
    pub union_size: usize,
}

impl Skeleton {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bodies: Vec::new(),
            joints: Vec::new(),
            offsets: Vec::new(),
            dof_map: Vec::new(),
            ndofs: 0,
            mobile: true,
            self_collision: false,
            time_step: 1e-3,
            gravity: Vec3::new(0.0, -arbor_math::GRAVITY, 0.0),
            initialized: false,
            scratch: Vec::new(),
            cache: Caches::default(),
            impulse_vel_change: DVec::zeros(0),
            impulse_applied: false,
            union_root: 0,
            union_size: 1,
        }
    }

    /// Append a body connected to `parent` (or the world when `None`)
    /// through `joint`. Returns the new body's index.
    ///
    /// Parents must be added before their children, which keeps the flat
    /// vector in BFS-compatible order.
    pub fn add_body(&mut self, parent: Option<usize>, joint: Joint, mut body: BodyNode) -> usize {
        let idx = self.bodies.len();
        body.parent = parent;
        if let Some(p) = parent {
            assert!(p < idx, "parent must be added before its child");
            self.bodies[p].children.push(idx);
        }
        self.bodies.push(body);
        self.joints.push(joint);
        self.initialized = false;
        idx
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn num_dofs(&self) -> usize {
        self.ndofs
    }

    pub fn body(&self, idx: usize) -> &BodyNode {
        &self.bodies[idx]
    }

    pub fn body_mut(&mut self, idx: usize) -> &mut BodyNode {
        &mut self.bodies[idx]
    }

    pub fn bodies(&self) -> &[BodyNode] {
        &self.bodies
    }

    pub fn joint(&self, idx: usize) -> &Joint {
        &self.joints[idx]
    }

    pub fn joint_mut(&mut self, idx: usize) -> &mut Joint {
        self.mark_all_dirty();
        &mut self.joints[idx]
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// DOF offset of a joint in the flattened registry.
    pub fn joint_offset(&self, joint_idx: usize) -> usize {
        self.offsets[joint_idx]
    }

    /// Generalized coordinate by flattened index.
    pub fn gencoord(&self, dof: usize) -> &GenCoord {
        let (j, l) = self.dof_map[dof];
        &self.joints[j].gencoords[l]
    }

    pub fn gencoord_mut(&mut self, dof: usize) -> &mut GenCoord {
        self.mark_all_dirty();
        let (j, l) = self.dof_map[dof];
        &mut self.joints[j].gencoords[l]
    }

    /// Whether this skeleton participates in the impulse solve.
    pub fn is_impulse_responsible(&self) -> bool {
        self.mobile && self.ndofs > 0
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn set_time_step(&mut self, dt: f64) {
        self.time_step = dt;
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        self.mark_all_dirty();
    }

    /// Validate the assembly and prepare scratch storage.
    ///
    /// Configuration errors (malformed axes, bad inertias) surface here,
    /// before any stepping happens.
    pub fn init(&mut self, time_step: f64, gravity: Vec3) -> Result<()> {
        self.time_step = time_step;
        self.gravity = gravity;

        for (i, body) in self.bodies.iter().enumerate() {
            if let Some(p) = body.parent {
                if p >= i {
                    return Err(DynamicsError::NonTreeTopology { child: i, parent: p });
                }
            }
            if !body.inertia.is_valid() {
                return Err(DynamicsError::InvalidInertia(body.name.clone()));
            }
        }

        self.offsets.clear();
        self.dof_map.clear();
        let mut offset = 0;
        for (j, joint) in self.joints.iter_mut().enumerate() {
            joint.validate()?;
            self.offsets.push(offset);
            for (l, g) in joint.gencoords.iter_mut().enumerate() {
                g.skel_index = offset + l;
                self.dof_map.push((j, l));
            }
            offset += joint.num_dofs();
        }
        self.ndofs = offset;

        self.scratch = self
            .joints
            .iter()
            .map(|j| {
                let n = j.num_dofs();
                JointScratch {
                    ai_s: Jacobian::zeros(n),
                    psi: DMat::zeros(n, n),
                    implicit_psi: DMat::zeros(n, n),
                    alpha: DVec::zeros(n),
                    imp_alpha: DVec::zeros(n),
                }
            })
            .collect();

        for body in &mut self.bodies {
            body.spatial_inertia = body.inertia.to_matrix();
        }

        self.cache.mass = DMat::zeros(self.ndofs, self.ndofs);
        self.cache.inv_mass = DMat::zeros(self.ndofs, self.ndofs);
        self.cache.coriolis = DVec::zeros(self.ndofs);
        self.cache.gravity = DVec::zeros(self.ndofs);
        self.cache.combined = DVec::zeros(self.ndofs);
        self.impulse_vel_change = DVec::zeros(self.ndofs);
        self.mark_all_dirty();
        self.initialized = true;

        self.compute_forward_kinematics(true, true, false);
        self.cache.dirty_kinematics = false;
        Ok(())
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.cache.dirty_kinematics = true;
        self.cache.dirty_mass = true;
        self.cache.dirty_inv_mass = true;
        self.cache.dirty_coriolis = true;
        self.cache.dirty_gravity = true;
        self.cache.dirty_combined = true;
    }

    fn mark_velocity_dirty(&mut self) {
        self.cache.dirty_kinematics = true;
        self.cache.dirty_coriolis = true;
        self.cache.dirty_combined = true;
    }

    /// Refresh forward kinematics if any state changed since the last
    /// pass.
    pub fn ensure_kinematics(&mut self) {
        if self.cache.dirty_kinematics {
            self.compute_forward_kinematics(true, true, false);
            self.cache.dirty_kinematics = false;
        }
    }

    // -- generalized state access ------------------------------------------

    pub fn positions(&self) -> DVec {
        DVec::from_iterator(self.ndofs, self.dof_map.iter().map(|&(j, l)| self.joints[j].gencoords[l].q))
    }

    pub fn set_positions(&mut self, q: &DVec) {
        assert_eq!(q.len(), self.ndofs);
        for (k, &(j, l)) in self.dof_map.iter().enumerate() {
            self.joints[j].gencoords[l].q = q[k];
        }
        self.mark_all_dirty();
    }

    pub fn velocities(&self) -> DVec {
        DVec::from_iterator(self.ndofs, self.dof_map.iter().map(|&(j, l)| self.joints[j].gencoords[l].v))
    }

    pub fn set_velocities(&mut self, v: &DVec) {
        assert_eq!(v.len(), self.ndofs);
        for (k, &(j, l)) in self.dof_map.iter().enumerate() {
            self.joints[j].gencoords[l].v = v[k];
        }
        self.mark_velocity_dirty();
    }

    pub fn accelerations(&self) -> DVec {
        DVec::from_iterator(self.ndofs, self.dof_map.iter().map(|&(j, l)| self.joints[j].gencoords[l].a))
    }

    /// Generalized actuation forces.
    pub fn forces(&self) -> DVec {
        DVec::from_iterator(self.ndofs, self.dof_map.iter().map(|&(j, l)| self.joints[j].gencoords[l].force))
    }

    pub fn set_forces(&mut self, tau: &DVec) {
        assert_eq!(tau.len(), self.ndofs);
        for (k, &(j, l)) in self.dof_map.iter().enumerate() {
            self.joints[j].gencoords[l].force = tau[k];
        }
    }

    pub fn clear_internal_forces(&mut self) {
        for joint in &mut self.joints {
            for g in &mut joint.gencoords {
                g.force = 0.0;
            }
        }
    }

    pub fn clear_external_forces(&mut self) {
        for body in &mut self.bodies {
            body.clear_external_force();
        }
    }

    /// State snapshot: `[q; v]` in DOF order.
    pub fn state(&self) -> DVec {
        let mut s = DVec::zeros(2 * self.ndofs);
        s.rows_mut(0, self.ndofs).copy_from(&self.positions());
        s.rows_mut(self.ndofs, self.ndofs).copy_from(&self.velocities());
        s
    }

    pub fn set_state(&mut self, s: &DVec) {
        assert_eq!(s.len(), 2 * self.ndofs);
        let q = s.rows(0, self.ndofs).into_owned();
        let v = s.rows(self.ndofs, self.ndofs).into_owned();
        self.set_positions(&q);
        self.set_velocities(&v);
    }

    // -- kinematics --------------------------------------------------------

    /// Forward kinematics over the tree in BFS order.
    ///
    /// Updates world transforms, body-frame spatial velocities and partial
    /// accelerations, and (optionally) spatial accelerations from the
    /// current generalized accelerations.
    pub fn compute_forward_kinematics(
        &mut self,
        transforms: bool,
        velocities: bool,
        accelerations: bool,
    ) {
        for i in 0..self.bodies.len() {
            if transforms {
                self.joints[i].update_transform();
                self.joints[i].update_jacobian();
            }
            if velocities {
                self.joints[i].update_jacobian_time_deriv();
            }

            let t = self.joints[i].transform;
            let parent = self.bodies[i].parent;

            if transforms {
                let w = match parent {
                    Some(p) => self.bodies[p].world_transform.mul(&t),
                    None => t,
                };
                self.bodies[i].world_transform = w;
            }

            if velocities {
                let qd = self.joints[i].velocities();
                let s_qd = SpatialVec::from_vec6(&self.joints[i].jacobian * &qd);
                let ds_qd = SpatialVec::from_vec6(&self.joints[i].jacobian_dot * &qd);
                let v_parent = match parent {
                    Some(p) => t.ad_inv(&self.bodies[p].velocity),
                    None => SpatialVec::zero(),
                };
                let v = v_parent + s_qd;
                self.bodies[i].velocity = v;
                self.bodies[i].partial_acceleration = v.cross_motion(&s_qd) + ds_qd;
            }

            if accelerations {
                let qdd = DVec::from_iterator(
                    self.joints[i].num_dofs(),
                    self.joints[i].gencoords.iter().map(|g| g.a),
                );
                let s_qdd = SpatialVec::from_vec6(&self.joints[i].jacobian * &qdd);
                let a_parent = match parent {
                    Some(p) => t.ad_inv(&self.bodies[p].acceleration),
                    None => SpatialVec::zero(),
                };
                self.bodies[i].acceleration =
                    a_parent + self.bodies[i].partial_acceleration + s_qdd;
            }
        }
    }

    // -- integration -------------------------------------------------------

    /// Semi-implicit Euler velocity update: `v += a dt`.
    pub fn integrate_velocities(&mut self, dt: f64) {
        for joint in &mut self.joints {
            for g in &mut joint.gencoords {
                g.v += g.a * dt;
            }
        }
        self.mark_velocity_dirty();
    }

    /// Position update; ball and free joints integrate on their manifold.
    pub fn integrate_positions(&mut self, dt: f64) {
        for joint in &mut self.joints {
            joint.integrate_positions(dt);
        }
        self.mark_all_dirty();
    }

    // -- energy ------------------------------------------------------------

    /// Kinetic energy `1/2 v^T M v`.
    pub fn kinetic_energy(&mut self) -> f64 {
        let v = self.velocities();
        let m = self.mass_matrix();
        0.5 * v.dot(&(m * &v))
    }

    /// Gravitational plus spring potential energy.
    pub fn potential_energy(&mut self) -> f64 {
        self.ensure_kinematics();
        let g = self.gravity;
        let mut pe = 0.0;
        for body in &self.bodies {
            pe -= body.inertia.mass * g.dot(&body.com_world());
        }
        for joint in &self.joints {
            pe += joint.potential_energy();
        }
        pe
    }

    // -- diagnostics -------------------------------------------------------

    /// Abort-worthy numerical check: every q, v, a must be finite.
    pub fn check_finite(&self) -> Result<()> {
        for joint in &self.joints {
            for g in &joint.gencoords {
                if !g.q.is_finite() {
                    return Err(DynamicsError::NonFinite("joint positions"));
                }
                if !g.v.is_finite() {
                    return Err(DynamicsError::NonFinite("joint velocities"));
                }
                if !g.a.is_finite() {
                    return Err(DynamicsError::NonFinite("joint accelerations"));
                }
            }
        }
        Ok(())
    }
}
