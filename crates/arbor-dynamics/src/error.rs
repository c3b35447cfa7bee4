//! Error types for skeleton construction and stepping.

use thiserror::Error;

/// Errors surfaced while assembling or stepping a skeleton.
#[derive(Debug, Error)]
pub enum DynamicsError {
    #[error("joint '{0}' has a non-unit axis")]
    NonUnitAxis(String),

    #[error("planar joint '{0}' has non-orthogonal translational axes")]
    NonOrthogonalAxes(String),

    #[error("joint '{0}' has an invalid frame offset transform")]
    InvalidJointOffset(String),

    #[error("body '{0}' has a non-finite or non-positive inertia")]
    InvalidInertia(String),

    #[error("body {child} lists parent {parent}, which is not an earlier node")]
    NonTreeTopology { child: usize, parent: usize },

    #[error("skeleton '{0}' must be initialized before stepping")]
    NotInitialized(String),

    #[error("articulated inertia became singular at joint '{0}'")]
    SingularInertia(String),

    #[error("non-finite value detected in {0}")]
    NonFinite(&'static str),
}

pub type Result<T> = std::result::Result<T, DynamicsError>;
