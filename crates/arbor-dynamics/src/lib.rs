//! Skeleton kinematics and Featherstone dynamics for the arbor physics
//! engine.
//!
//! A [`Skeleton`] owns its [`BodyNode`]s and [`Joint`]s in flat vectors
//! with index back-references, runs forward kinematics in BFS order, and
//! provides both `M^-1`-based and articulated-body forward dynamics along
//! with the unit-impulse pipeline consumed by the constraint solver.

pub mod body;
pub mod dynamics;
pub mod error;
pub mod gencoord;
pub mod joint;
pub mod skeleton;

pub use body::BodyNode;
pub use error::{DynamicsError, Result};
pub use gencoord::GenCoord;
pub use joint::{EulerConvention, Joint, JointKind, PlaneType};
pub use skeleton::Skeleton;
