//! Boxed LCP solved by projected Gauss-Seidel.
//!
//! Solves `A x = b + w` with `lo_i <= x_i <= hi_i` and the usual
//! complementarity conditions on `w`. Rows with `findex[i] >= 0` are
//! friction rows: their bounds rescale every sweep to
//! `+-mu * max(x[findex[i]], 0)`, with the per-row `mu` stored in the
//! base bounds.

use arbor_math::{DMat, DVec};

/// Iteration controls for the projected Gauss-Seidel loop.
#[derive(Debug, Clone, Copy)]
pub struct LcpOptions {
    pub max_iterations: usize,
    /// Convergence threshold on the max-norm of the impulse update.
    pub tolerance: f64,
}

impl Default for LcpOptions {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-6,
        }
    }
}

/// Run boxed PGS in place on `x`. Returns whether the iteration
/// converged before hitting the cap.
pub fn solve_boxed_pgs(
    a: &DMat,
    x: &mut DVec,
    b: &DVec,
    lo: &DVec,
    hi: &DVec,
    findex: &[i64],
    options: &LcpOptions,
) -> bool {
    let n = x.len();
    for _ in 0..options.max_iterations {
        let mut max_delta = 0.0f64;
        for i in 0..n {
            let a_ii = a[(i, i)];
            if a_ii.abs() < 1e-12 {
                continue;
            }

            let (lo_i, hi_i) = if findex[i] >= 0 {
                let coupled = x[findex[i] as usize].max(0.0);
                (lo[i] * coupled, hi[i] * coupled)
            } else {
                (lo[i], hi[i])
            };

            let mut ax = 0.0;
            for j in 0..n {
                ax += a[(i, j)] * x[j];
            }
            let updated = (x[i] + (b[i] - ax) / a_ii).clamp(lo_i, hi_i);
            max_delta = max_delta.max((updated - x[i]).abs());
            x[i] = updated;
        }
        if max_delta < options.tolerance {
            return true;
        }
    }
    false
}

/// Complementarity slack `w = A x - b`.
pub fn residual(a: &DMat, x: &DVec, b: &DVec) -> DVec {
    a * x - b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(a: DMat, b: DVec, lo: DVec, hi: DVec, findex: Vec<i64>) -> (DVec, DVec) {
        let mut x = DVec::zeros(b.len());
        let opts = LcpOptions {
            max_iterations: 500,
            tolerance: 1e-12,
        };
        let converged = solve_boxed_pgs(&a, &mut x, &b, &lo, &hi, &findex, &opts);
        assert!(converged);
        let w = residual(&a, &x, &b);
        (x, w)
    }

    #[test]
    fn unconstrained_interior_solution() {
        let a = DMat::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVec::from_vec(vec![1.0, 2.0]);
        let lo = DVec::from_element(2, f64::NEG_INFINITY);
        let hi = DVec::from_element(2, f64::INFINITY);
        let (x, w) = solve(a.clone(), b.clone(), lo, hi, vec![-1, -1]);
        // Interior solution solves A x = b exactly.
        assert!(w.norm() < 1e-9, "w = {w}");
        assert!((&a * &x - b).norm() < 1e-9);
    }

    #[test]
    fn non_negativity_clamps() {
        // b < 0 with x >= 0 forces the zero solution with non-negative
        // slack on the clamped row.
        let a = DMat::from_row_slice(1, 1, &[2.0]);
        let b = DVec::from_vec(vec![-3.0]);
        let lo = DVec::from_vec(vec![0.0]);
        let hi = DVec::from_vec(vec![f64::INFINITY]);
        let (x, w) = solve(a, b, lo, hi, vec![-1]);
        assert_eq!(x[0], 0.0);
        assert!(w[0] >= 0.0);
    }

    #[test]
    fn friction_row_boxed_by_normal_impulse() {
        // Row 0: normal, wants x0 = 2. Row 1: friction with mu = 0.5,
        // wants more than the box allows; must clamp at mu * x0.
        let a = DMat::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVec::from_vec(vec![2.0, 5.0]);
        let lo = DVec::from_vec(vec![0.0, -0.5]);
        let hi = DVec::from_vec(vec![f64::INFINITY, 0.5]);
        let (x, _w) = solve(a, b, lo, hi, vec![-1, 0]);
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9, "friction clamped at mu * x0");
    }

    #[test]
    fn complementarity_holds_on_mixed_problem() {
        let a = DMat::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 2.0]);
        let b = DVec::from_vec(vec![1.0, -4.0]);
        let lo = DVec::from_vec(vec![0.0, 0.0]);
        let hi = DVec::from_element(2, f64::INFINITY);
        let (x, w) = solve(a, b, lo, hi, vec![-1, -1]);
        for i in 0..2 {
            let at_lower = x[i] == 0.0 && w[i] >= -1e-9;
            let interior = x[i] > 0.0 && w[i].abs() < 1e-9;
            assert!(at_lower || interior, "row {i}: x = {}, w = {}", x[i], w[i]);
        }
    }
}
