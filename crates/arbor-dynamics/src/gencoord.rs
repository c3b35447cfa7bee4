//! Generalized coordinates — one scalar degree of freedom each.

/// A single generalized coordinate: position, velocity, acceleration,
/// force, and their limits, plus per-DOF spring/damper parameters.
///
/// Limits are not enforced by the coordinate itself; position limits are
/// handled by joint-limit constraints during the solve.
#[derive(Debug, Clone)]
pub struct GenCoord {
    /// Position.
    pub q: f64,
    /// Velocity.
    pub v: f64,
    /// Acceleration.
    pub a: f64,
    /// Generalized (actuation) force.
    pub force: f64,

    /// Position limits.
    pub q_min: f64,
    pub q_max: f64,
    /// Velocity limits.
    pub v_min: f64,
    pub v_max: f64,
    /// Force limits.
    pub force_min: f64,
    pub force_max: f64,

    /// Spring stiffness toward [`GenCoord::rest_position`].
    pub spring_stiffness: f64,
    /// Viscous damping coefficient.
    pub damping: f64,
    /// Spring rest position.
    pub rest_position: f64,

    /// Velocity change produced by the last constraint-impulse pass.
    pub vel_change: f64,
    /// Accumulated joint-space constraint impulse (joint limits).
    pub constraint_impulse: f64,

    /// Index into the owning skeleton's flattened DOF registry.
    pub skel_index: usize,
}

impl GenCoord {
    pub fn new() -> Self {
        Self {
            q: 0.0,
            v: 0.0,
            a: 0.0,
            force: 0.0,
            q_min: f64::NEG_INFINITY,
            q_max: f64::INFINITY,
            v_min: f64::NEG_INFINITY,
            v_max: f64::INFINITY,
            force_min: f64::NEG_INFINITY,
            force_max: f64::INFINITY,
            spring_stiffness: 0.0,
            damping: 0.0,
            rest_position: 0.0,
            vel_change: 0.0,
            constraint_impulse: 0.0,
            skel_index: 0,
        }
    }

    /// Set the rest position, warning when it lies outside the position
    /// limits (kept anyway; this is a diagnostic, not an error).
    pub fn set_rest_position(&mut self, q0: f64) {
        if q0 < self.q_min || q0 > self.q_max {
            log::warn!(
                "rest position {q0} is outside the limit range [{}, {}]",
                self.q_min,
                self.q_max
            );
        }
        self.rest_position = q0;
    }

    /// Implicit spring force `-k (q + v dt - q0)`.
    #[inline]
    pub fn spring_force(&self, dt: f64) -> f64 {
        -self.spring_stiffness * (self.q + self.v * dt - self.rest_position)
    }

    /// Damping force `-d v`.
    #[inline]
    pub fn damping_force(&self) -> f64 {
        -self.damping * self.v
    }
}

impl Default for GenCoord {
    fn default() -> Self {
        Self::new()
    }
}
