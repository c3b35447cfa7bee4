//! Impulse-based constraint solver for the arbor physics engine.
//!
//! Constraints expose per-row Jacobians and bounds; the solver groups
//! skeletons that share active constraints with a union-find, assembles
//! one boxed LCP per group by unit-impulse probes through the skeletons'
//! articulated-inertia solve, and runs projected Gauss-Seidel with
//! friction-index coupling.

pub mod constraint;
pub mod contact;
pub mod joint_constraint;
pub mod joint_limit;
pub mod lcp;
pub mod solver;

pub use constraint::{
    Constraint, ConstraintInfo, ContactParams, BOUNCE_VELOCITY_THRESHOLD, CONTACT_EPSILON,
    FRICTION_THRESHOLD, MAX_BOUNCE_VELOCITY, RESTITUTION_THRESHOLD,
};
pub use contact::ContactConstraint;
pub use joint_constraint::{BallJointConstraint, WeldJointConstraint};
pub use joint_limit::JointLimitConstraint;
pub use lcp::{solve_boxed_pgs, LcpOptions};
pub use solver::{compress_path, reset_union, unite, ConstraintSolver};
