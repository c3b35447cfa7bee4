//! The simulation world: owns skeletons, drives the per-step pipeline.

use arbor_collision::{collide, sweep_and_prune, Contact, MprOptions};
use arbor_constraint::ConstraintSolver;
use arbor_dynamics::{DynamicsError, Skeleton};
use arbor_math::Vec3;

/// A world advances a set of skeletons through discrete time steps while
/// enforcing non-penetration, Coulomb friction, and joint limits.
///
/// Per step: forward kinematics, unconstrained articulated-body forward
/// dynamics, velocity integration, collision detection, the grouped
/// boxed-LCP constraint solve (which corrects velocities by impulses),
/// position integration, and bookkeeping. External force accumulators
/// are cleared automatically at the end of each step.
pub struct World {
    skeletons: Vec<Skeleton>,
    /// Accumulated simulation time.
    pub time: f64,
    time_step: f64,
    gravity: Vec3,
    /// Constraint solver; its `params` and `lcp_options` are the
    /// tuning surface.
    pub solver: ConstraintSolver,
    /// Narrow-phase MPR controls.
    pub collision_options: MprOptions,
    contacts: Vec<Contact>,
}

impl World {
    /// An empty world with `dt = 1e-3` and gravity `(0, -9.81, 0)`.
    pub fn new() -> Self {
        Self {
            skeletons: Vec::new(),
            time: 0.0,
            time_step: 1e-3,
            gravity: Vec3::new(0.0, -arbor_math::GRAVITY, 0.0),
            solver: ConstraintSolver::new(),
            collision_options: MprOptions::default(),
            contacts: Vec::new(),
        }
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Set the step size; applies to already-added skeletons too.
    pub fn set_time_step(&mut self, dt: f64) {
        self.time_step = dt;
        for s in &mut self.skeletons {
            s.set_time_step(dt);
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Set the gravity vector; applies to already-added skeletons too.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        for s in &mut self.skeletons {
            s.set_gravity(gravity);
        }
    }

    /// Validate and adopt a skeleton. Returns its index.
    pub fn add_skeleton(&mut self, mut skeleton: Skeleton) -> Result<usize, DynamicsError> {
        skeleton.init(self.time_step, self.gravity)?;
        self.skeletons.push(skeleton);
        Ok(self.skeletons.len() - 1)
    }

    pub fn num_skeletons(&self) -> usize {
        self.skeletons.len()
    }

    pub fn skeleton(&self, idx: usize) -> &Skeleton {
        &self.skeletons[idx]
    }

    pub fn skeleton_mut(&mut self, idx: usize) -> &mut Skeleton {
        &mut self.skeletons[idx]
    }

    pub fn skeletons(&self) -> &[Skeleton] {
        &self.skeletons
    }

    /// Contacts found in the last step.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Impulses the solver applied per contact in the last step (normal
    /// row first, then the tangent pair when friction is on).
    pub fn contact_impulses(&self) -> &[Vec<f64>] {
        self.solver.last_contact_impulses()
    }

    /// Concatenated `[q; v]` snapshots of every skeleton, in insertion
    /// and DOF order.
    pub fn state(&self) -> Vec<f64> {
        let mut out = Vec::new();
        for s in &self.skeletons {
            out.extend_from_slice(s.state().as_slice());
        }
        out
    }

    pub fn set_state(&mut self, state: &[f64]) {
        let mut off = 0;
        for s in &mut self.skeletons {
            let n = 2 * s.num_dofs();
            s.set_state(&arbor_math::DVec::from_column_slice(&state[off..off + n]));
            off += n;
        }
    }

    /// Advance the world by one time step.
    pub fn step(&mut self) -> Result<(), DynamicsError> {
        let dt = self.time_step;

        // Unconstrained forward dynamics, then the velocity half of the
        // semi-implicit Euler update. The articulated factorization left
        // behind backs the constraint solver's unit-impulse probes.
        for skel in &mut self.skeletons {
            if skel.mobile && skel.num_dofs() > 0 {
                skel.forward_dynamics()?;
                skel.integrate_velocities(dt);
                skel.compute_forward_kinematics(false, true, false);
            } else {
                skel.ensure_kinematics();
            }
        }

        self.contacts = self.detect_collisions();
        self.solver.solve(&mut self.skeletons, &self.contacts, dt);

        for skel in &mut self.skeletons {
            if skel.mobile && skel.num_dofs() > 0 {
                skel.integrate_positions(dt);
                skel.clear_external_forces();
                skel.ensure_kinematics();
                skel.check_finite()?;
            }
        }

        self.time += dt;
        Ok(())
    }

    /// Broad + narrow phase over every shape of every body.
    fn detect_collisions(&mut self) -> Vec<Contact> {
        struct Entry {
            skeleton: usize,
            body: usize,
            shape: usize,
            world: arbor_math::Transform,
        }

        let mut entries = Vec::new();
        let mut aabbs = Vec::new();
        for (si, skel) in self.skeletons.iter().enumerate() {
            for (bi, body) in skel.bodies().iter().enumerate() {
                for (gi, shape_node) in body.shapes.iter().enumerate() {
                    let world = body.world_transform.mul(&shape_node.offset);
                    aabbs.push(shape_node.shape.aabb(&world));
                    entries.push(Entry {
                        skeleton: si,
                        body: bi,
                        shape: gi,
                        world,
                    });
                }
            }
        }

        let mut contacts = Vec::new();
        for (i, j) in sweep_and_prune(&aabbs) {
            let (a, b) = (&entries[i], &entries[j]);
            if a.skeleton == b.skeleton {
                if a.body == b.body {
                    continue;
                }
                let skel = &self.skeletons[a.skeleton];
                if !skel.self_collision {
                    continue;
                }
                // Adjacent bodies share a joint; never collide them.
                if skel.body(a.body).parent == Some(b.body)
                    || skel.body(b.body).parent == Some(a.body)
                {
                    continue;
                }
            }
            let mobile1 = self.skeletons[a.skeleton].is_impulse_responsible();
            let mobile2 = self.skeletons[b.skeleton].is_impulse_responsible();
            if !mobile1 && !mobile2 {
                continue;
            }

            let shape1 = &self.skeletons[a.skeleton].body(a.body).shapes[a.shape].shape;
            let shape2 = &self.skeletons[b.skeleton].body(b.body).shapes[b.shape].shape;
            for point in collide(shape1, &a.world, shape2, &b.world, &self.collision_options) {
                contacts.push(Contact {
                    point: point.point,
                    normal: point.normal,
                    depth: point.depth,
                    skeleton1: a.skeleton,
                    body1: a.body,
                    skeleton2: b.skeleton,
                    body2: b.body,
                });
            }
        }
        contacts
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
