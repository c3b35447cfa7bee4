//! The constraint interface and shared solver parameters.

use arbor_dynamics::Skeleton;
use arbor_math::Vec3;

/// Restitution below this threshold disables bounce for a contact.
pub const RESTITUTION_THRESHOLD: f64 = 1e-3;
/// Friction below this threshold makes a contact frictionless.
pub const FRICTION_THRESHOLD: f64 = 1e-3;
/// Restitution velocities below this threshold do not bounce.
pub const BOUNCE_VELOCITY_THRESHOLD: f64 = 1e-1;
/// Cap on the restitution velocity.
pub const MAX_BOUNCE_VELOCITY: f64 = 1e2;
/// Tolerance for tangent-basis orthogonality checks.
pub const CONTACT_EPSILON: f64 = 1e-6;

/// Error-feedback and softening parameters, configured at setup and
/// read-only during stepping.
#[derive(Debug, Clone, Copy)]
pub struct ContactParams {
    /// Penetration depth tolerated without correction.
    pub error_allowance: f64,
    /// Error-reduction parameter: fraction of the remaining penetration
    /// corrected per step.
    pub erp: f64,
    /// Cap on the error-reduction velocity.
    pub max_error_reduction_velocity: f64,
    /// Constraint-force mixing: diagonal softening that keeps the LCP
    /// matrix nonsingular.
    pub cfm: f64,
    /// Seed direction for the friction tangent basis.
    pub first_friction_direction: Vec3,
}

impl Default for ContactParams {
    fn default() -> Self {
        Self {
            error_allowance: 0.0,
            erp: 0.01,
            max_error_reduction_velocity: 1e1,
            cfm: 1e-5,
            first_friction_direction: Vec3::z(),
        }
    }
}

impl ContactParams {
    /// Set the error allowance, clamping negatives to zero.
    pub fn set_error_allowance(&mut self, allowance: f64) {
        if allowance < 0.0 {
            log::warn!("error allowance {allowance} is negative; clamped to 0");
            self.error_allowance = 0.0;
        } else {
            self.error_allowance = allowance;
        }
    }

    /// Set the error-reduction parameter, clamping to [0, 1].
    pub fn set_erp(&mut self, erp: f64) {
        if !(0.0..=1.0).contains(&erp) {
            log::warn!("error reduction parameter {erp} outside [0, 1]; clamped");
        }
        self.erp = erp.clamp(0.0, 1.0);
    }

    /// Set the maximum error-reduction velocity, clamping negatives.
    pub fn set_max_error_reduction_velocity(&mut self, erv: f64) {
        if erv < 0.0 {
            log::warn!("max error reduction velocity {erv} is negative; clamped to 0");
            self.max_error_reduction_velocity = 0.0;
        } else {
            self.max_error_reduction_velocity = erv;
        }
    }

    /// Set the constraint-force-mixing value, clamping to [1e-9, 1].
    pub fn set_cfm(&mut self, cfm: f64) {
        if !(1e-9..=1.0).contains(&cfm) {
            log::warn!("constraint force mixing {cfm} outside [1e-9, 1]; clamped");
        }
        self.cfm = cfm.clamp(1e-9, 1.0);
    }

    /// Set the first frictional direction (normalized).
    pub fn set_first_friction_direction(&mut self, dir: Vec3) {
        self.first_friction_direction = dir.normalize();
    }
}

/// Per-group LCP rows owned by one constraint, viewed through offsets.
pub struct ConstraintInfo<'a> {
    /// Impulse initial guess / solution.
    pub x: &'a mut [f64],
    /// Lower bounds (friction rows store `-mu`, rescaled at solve time).
    pub lo: &'a mut [f64],
    /// Upper bounds.
    pub hi: &'a mut [f64],
    /// Right-hand side: desired post-impulse constraint velocities.
    pub b: &'a mut [f64],
    /// Complementarity slack, initialized to zero.
    pub w: &'a mut [f64],
    /// Friction coupling: local row index of the governing normal row,
    /// or -1.
    pub findex: &'a mut [i64],
    /// `1 / dt` for error-reduction terms.
    pub inv_time_step: f64,
}

/// A polymorphic constraint: a block of LCP rows backed by one or two
/// skeletons.
///
/// `apply_unit_impulse` / `get_velocity_change` realize one column of the
/// implicit `J M^-1 J^T` through the skeletons' articulated-body solve;
/// `apply_impulse` commits the solved impulses to the bodies.
pub trait Constraint {
    /// Number of rows.
    fn dimension(&self) -> usize;

    /// Refresh pose-dependent data and activity at the start of a solve.
    fn update(&mut self, skeletons: &[Skeleton]);

    /// Whether this constraint participates in the current solve.
    fn is_active(&self) -> bool;

    /// The one or two skeletons this constraint couples.
    fn involved_skeletons(&self) -> (usize, Option<usize>);

    /// Fill bounds, bias, friction indices, and the initial guess.
    fn get_information(&mut self, skeletons: &[Skeleton], info: &mut ConstraintInfo);

    /// Apply a unit impulse along row `index` through the articulated
    /// inertia solve, leaving velocity changes on the bodies.
    fn apply_unit_impulse(&mut self, skeletons: &mut [Skeleton], index: usize);

    /// Read the velocity change of every row after a probe; adds CFM
    /// softening on the probed row when `with_cfm`.
    fn get_velocity_change(&self, skeletons: &[Skeleton], delta_v: &mut [f64], with_cfm: bool);

    /// Clear the probe flags on the involved skeletons.
    fn unexcite(&self, skeletons: &mut [Skeleton]);

    /// Commit solved impulses `x` to the bodies' accumulators.
    fn apply_impulse(&mut self, skeletons: &mut [Skeleton], impulses: &[f64]);
}
