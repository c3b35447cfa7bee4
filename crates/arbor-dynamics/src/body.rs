//! Body nodes — rigid links of a skeleton tree.

use arbor_collision::ShapeNode;
use arbor_math::{Mat6, SpatialInertia, SpatialVec, Transform, Vec3};

/// A rigid body in a skeleton tree.
///
/// Bodies are owned by their skeleton in a flat vector; `parent` and
/// `children` are indices into that vector, with every parent preceding
/// its descendants. Spatial state (velocity, acceleration, impulses) is
/// expressed in the body frame.
#[derive(Debug, Clone)]
pub struct BodyNode {
    pub name: String,
    /// Parent body index; `None` for a root.
    pub parent: Option<usize>,
    /// Child body indices (back-references, non-owning).
    pub children: Vec<usize>,

    /// Spatial inertia in the body frame.
    pub inertia: SpatialInertia,
    /// Cached 6x6 form of `inertia`, filled at skeleton init.
    pub(crate) spatial_inertia: Mat6,
    /// Restitution coefficient (combined per contact as `e1 * e2`).
    pub restitution: f64,
    /// Friction coefficient (combined per contact as `min(mu1, mu2)`).
    pub friction: f64,
    /// Collision shapes attached to this body.
    pub shapes: Vec<ShapeNode>,

    /// World transform `W`.
    pub world_transform: Transform,
    /// Spatial velocity in the body frame.
    pub velocity: SpatialVec,
    /// Spatial acceleration in the body frame.
    pub acceleration: SpatialVec,
    /// Partial acceleration `eta = ad(V) S qdot + dS qdot`.
    pub(crate) partial_acceleration: SpatialVec,

    /// Accumulated external wrench (body frame); cleared at end of step.
    pub(crate) external_force: SpatialVec,
    /// Gravity wrench for the current pose.
    pub(crate) gravity_force: SpatialVec,

    /// Articulated inertia of the subtree rooted here.
    pub(crate) art_inertia: Mat6,
    /// Articulated bias force.
    pub(crate) bias_force: SpatialVec,

    /// Accumulated constraint impulse (body frame wrench impulse).
    pub(crate) constraint_impulse: SpatialVec,
    /// Articulated bias impulse.
    pub(crate) bias_impulse: SpatialVec,
    /// Velocity change produced by the last impulse propagation.
    pub velocity_change: SpatialVec,
}

impl BodyNode {
    pub fn new(name: &str, inertia: SpatialInertia) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            inertia,
            spatial_inertia: Mat6::zeros(),
            restitution: 0.0,
            friction: 1.0,
            shapes: Vec::new(),
            world_transform: Transform::identity(),
            velocity: SpatialVec::zero(),
            acceleration: SpatialVec::zero(),
            partial_acceleration: SpatialVec::zero(),
            external_force: SpatialVec::zero(),
            gravity_force: SpatialVec::zero(),
            art_inertia: Mat6::zeros(),
            bias_force: SpatialVec::zero(),
            constraint_impulse: SpatialVec::zero(),
            bias_impulse: SpatialVec::zero(),
            velocity_change: SpatialVec::zero(),
        }
    }

    /// Attach a collision shape.
    pub fn add_shape(&mut self, shape: ShapeNode) {
        self.shapes.push(shape);
    }

    /// Accumulate an external force applied at a point on the body.
    ///
    /// `force` may be given in world or body coordinates, `offset` in
    /// body coordinates or as a world point; both are converted to a body
    /// frame wrench using the current world transform.
    pub fn add_external_force(
        &mut self,
        force: &Vec3,
        offset: &Vec3,
        is_force_local: bool,
        is_offset_local: bool,
    ) {
        let f = if is_force_local {
            *force
        } else {
            self.world_transform.rot.transpose() * force
        };
        let p = if is_offset_local {
            *offset
        } else {
            self.world_transform.inverse().transform_point(offset)
        };
        self.external_force = self.external_force + SpatialVec::new(p.cross(&f), f);
    }

    /// Accumulate an external wrench given directly in the body frame.
    pub fn add_external_wrench(&mut self, wrench: &SpatialVec) {
        self.external_force = self.external_force + *wrench;
    }

    /// External wrench accumulated so far.
    pub fn external_force(&self) -> SpatialVec {
        self.external_force
    }

    /// Clear the external wrench accumulator.
    pub fn clear_external_force(&mut self) {
        self.external_force = SpatialVec::zero();
    }

    /// Accumulate a constraint impulse (body frame).
    pub fn add_constraint_impulse(&mut self, imp: &SpatialVec) {
        self.constraint_impulse = self.constraint_impulse + *imp;
    }

    /// Constraint impulse accumulated during the current solve.
    pub fn constraint_impulse(&self) -> SpatialVec {
        self.constraint_impulse
    }

    /// Center of mass in world coordinates.
    pub fn com_world(&self) -> Vec3 {
        self.world_transform.transform_point(&self.inertia.com)
    }
}
