//! arbor — articulated rigid-body dynamics with impulse-based frictional
//! contacts.
//!
//! This is the umbrella crate: it provides the [`World`] step loop and
//! re-exports the core types from the sub-crates.

pub use arbor_collision::{
    self, collide, Aabb, Contact, ContactPoint, MprOptions, Shape, ShapeNode,
};
pub use arbor_constraint::{
    self, BallJointConstraint, ConstraintSolver, ContactConstraint, ContactParams,
    JointLimitConstraint, LcpOptions, WeldJointConstraint,
};
pub use arbor_dynamics::{
    self, BodyNode, DynamicsError, EulerConvention, GenCoord, Joint, JointKind, PlaneType,
    Skeleton,
};
pub use arbor_math::{
    self, exp_map, exp_map_rot, log_map, log_map_rot, verify_transform, DMat, DVec, Mat3, Mat6,
    SpatialInertia, SpatialVec, Transform, Vec3, GRAVITY,
};

mod world;
pub use world::World;
