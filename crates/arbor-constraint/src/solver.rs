//! Constraint solver: union-find grouping and per-group boxed LCP.

use std::collections::BTreeMap;

use crate::constraint::{Constraint, ConstraintInfo, ContactParams};
use crate::contact::ContactConstraint;
use crate::joint_limit::JointLimitConstraint;
use crate::lcp::{solve_boxed_pgs, LcpOptions};
use arbor_collision::Contact;
use arbor_dynamics::Skeleton;
use arbor_math::{DMat, DVec};

// -- union-find over skeletons ---------------------------------------------
//
// Skeletons that share an active constraint must be solved in one LCP
// block; the union-find lives on the skeletons themselves (`union_root`,
// `union_size`) and is reset at the start of every solve.

/// Reset every skeleton to its own singleton set.
pub fn reset_union(skeletons: &mut [Skeleton]) {
    for (i, s) in skeletons.iter_mut().enumerate() {
        s.union_root = i;
        s.union_size = 1;
    }
}

/// Find the set root with path compression.
pub fn compress_path(skeletons: &mut [Skeleton], index: usize) -> usize {
    let mut root = index;
    while skeletons[root].union_root != root {
        root = skeletons[root].union_root;
    }
    let mut cur = index;
    while cur != root {
        let next = skeletons[cur].union_root;
        skeletons[cur].union_root = root;
        cur = next;
    }
    root
}

/// Unite two sets; the smaller tree attaches to the larger.
pub fn unite(skeletons: &mut [Skeleton], a: usize, b: usize) {
    let root_a = compress_path(skeletons, a);
    let root_b = compress_path(skeletons, b);
    if root_a == root_b {
        return;
    }
    if skeletons[root_a].union_size < skeletons[root_b].union_size {
        skeletons[root_a].union_root = root_b;
        skeletons[root_b].union_size += skeletons[root_a].union_size;
    } else {
        skeletons[root_b].union_root = root_a;
        skeletons[root_a].union_size += skeletons[root_b].union_size;
    }
}

// -- solver ------------------------------------------------------------------

/// Builds contact and joint-limit constraints each step, groups them,
/// and solves one boxed LCP per group through unit-impulse probes.
pub struct ConstraintSolver {
    /// Error-feedback and softening parameters shared by the built
    /// constraints.
    pub params: ContactParams,
    /// PGS iteration controls.
    pub lcp_options: LcpOptions,
    /// User-added persistent constraints (welds, ball links).
    user_constraints: Vec<Box<dyn Constraint>>,
    /// Per-contact impulses from the last solve, aligned with the input
    /// contact list.
    last_contact_impulses: Vec<Vec<f64>>,
}

impl ConstraintSolver {
    pub fn new() -> Self {
        Self {
            params: ContactParams::default(),
            lcp_options: LcpOptions::default(),
            user_constraints: Vec::new(),
            last_contact_impulses: Vec::new(),
        }
    }

    /// Register a persistent constraint (e.g. a weld between skeletons).
    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) {
        self.user_constraints.push(constraint);
    }

    /// Impulses applied per contact in the last solve (rows in the
    /// contact constraint's order: normal, then tangents).
    pub fn last_contact_impulses(&self) -> &[Vec<f64>] {
        &self.last_contact_impulses
    }

    /// Resolve all constraints for this step.
    ///
    /// Expects every mobile skeleton to have fresh forward dynamics (the
    /// articulated factorization backs the unit-impulse probes). Leaves
    /// updated generalized velocities on the skeletons.
    pub fn solve(&mut self, skeletons: &mut [Skeleton], contacts: &[Contact], dt: f64) {
        for s in skeletons.iter_mut() {
            s.reset_constraint_state();
        }

        let params = self.params;
        let mut contact_constraints: Vec<ContactConstraint> = contacts
            .iter()
            .map(|c| ContactConstraint::new(c.clone(), skeletons, &params))
            .collect();

        let mut limit_constraints: Vec<JointLimitConstraint> = Vec::new();
        for (si, skel) in skeletons.iter().enumerate() {
            if !skel.is_impulse_responsible() {
                continue;
            }
            for (ji, joint) in skel.joints().iter().enumerate() {
                let limited = joint.position_limited
                    && joint
                        .gencoords
                        .iter()
                        .any(|g| g.q_min.is_finite() || g.q_max.is_finite());
                if limited {
                    limit_constraints.push(JointLimitConstraint::new(si, ji, &params));
                }
            }
        }

        let mut constraints: Vec<&mut dyn Constraint> = Vec::new();
        for c in contact_constraints.iter_mut() {
            constraints.push(c);
        }
        for c in limit_constraints.iter_mut() {
            constraints.push(c);
        }
        for c in self.user_constraints.iter_mut() {
            constraints.push(c.as_mut());
        }

        let mut active = Vec::new();
        for (i, c) in constraints.iter_mut().enumerate() {
            c.update(skeletons);
            if c.is_active() && c.dimension() > 0 {
                active.push(i);
            }
        }

        // Group skeletons that share active constraints.
        reset_union(skeletons);
        for &ci in &active {
            let (s1, s2) = constraints[ci].involved_skeletons();
            if let Some(s2) = s2 {
                if s1 != s2
                    && skeletons[s1].is_impulse_responsible()
                    && skeletons[s2].is_impulse_responsible()
                {
                    unite(skeletons, s1, s2);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &ci in &active {
            let (s1, s2) = constraints[ci].involved_skeletons();
            let anchor = if skeletons[s1].is_impulse_responsible() {
                s1
            } else if let Some(s2) = s2 {
                if skeletons[s2].is_impulse_responsible() {
                    s2
                } else {
                    continue;
                }
            } else {
                continue;
            };
            let root = compress_path(skeletons, anchor);
            groups.entry(root).or_default().push(ci);
        }

        for members in groups.values() {
            solve_group(skeletons, &mut constraints, members, dt, &self.lcp_options);
        }

        self.last_contact_impulses = contact_constraints
            .iter()
            .map(|c| c.applied_impulses.clone())
            .collect();
    }
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble and solve one constrained group.
fn solve_group(
    skeletons: &mut [Skeleton],
    constraints: &mut [&mut dyn Constraint],
    members: &[usize],
    dt: f64,
    options: &LcpOptions,
) {
    let dims: Vec<usize> = members.iter().map(|&i| constraints[i].dimension()).collect();
    let n: usize = dims.iter().sum();
    if n == 0 {
        return;
    }
    let mut offsets = Vec::with_capacity(members.len());
    let mut acc = 0;
    for d in &dims {
        offsets.push(acc);
        acc += d;
    }

    let mut x = vec![0.0; n];
    let mut lo = vec![0.0; n];
    let mut hi = vec![0.0; n];
    let mut b = vec![0.0; n];
    let mut w = vec![0.0; n];
    let mut findex = vec![-1i64; n];

    for (k, &ci) in members.iter().enumerate() {
        let (off, d) = (offsets[k], dims[k]);
        let mut info = ConstraintInfo {
            x: &mut x[off..off + d],
            lo: &mut lo[off..off + d],
            hi: &mut hi[off..off + d],
            b: &mut b[off..off + d],
            w: &mut w[off..off + d],
            findex: &mut findex[off..off + d],
            inv_time_step: 1.0 / dt,
        };
        constraints[ci].get_information(skeletons, &mut info);
        // Friction indices arrive constraint-local; shift to group rows.
        for f in &mut findex[off..off + d] {
            if *f >= 0 {
                *f += off as i64;
            }
        }
    }

    // One probe per row realizes one column of A = J M^-1 J^T.
    let mut a = DMat::zeros(n, n);
    for (k, &ci) in members.iter().enumerate() {
        for r in 0..dims[k] {
            constraints[ci].apply_unit_impulse(skeletons, r);
            let col = offsets[k] + r;
            for (k2, &cj) in members.iter().enumerate() {
                let mut dv = vec![0.0; dims[k2]];
                constraints[cj].get_velocity_change(skeletons, &mut dv, ci == cj);
                for (rr, val) in dv.iter().enumerate() {
                    a[(offsets[k2] + rr, col)] = *val;
                }
            }
            constraints[ci].unexcite(skeletons);
        }
    }

    let mut x_v = DVec::from_vec(x);
    let b_v = DVec::from_vec(b);
    let lo_v = DVec::from_vec(lo);
    let hi_v = DVec::from_vec(hi);
    let converged = solve_boxed_pgs(&a, &mut x_v, &b_v, &lo_v, &hi_v, &findex, options);
    if !converged {
        log::warn!("constraint LCP hit the iteration cap; applying best-effort impulses");
    }

    // Commit: clear probe residue, accumulate the solved impulses, then
    // run one impulse forward dynamics per skeleton in the group.
    let mut involved: Vec<usize> = Vec::new();
    for &ci in members {
        let (s1, s2) = constraints[ci].involved_skeletons();
        if !involved.contains(&s1) {
            involved.push(s1);
        }
        if let Some(s2) = s2 {
            if !involved.contains(&s2) {
                involved.push(s2);
            }
        }
    }
    for &s in &involved {
        skeletons[s].clear_constraint_impulses();
    }
    for (k, &ci) in members.iter().enumerate() {
        let (off, d) = (offsets[k], dims[k]);
        constraints[ci].apply_impulse(skeletons, &x_v.as_slice()[off..off + d]);
    }
    for &s in &involved {
        if skeletons[s].is_impulse_responsible() {
            skeletons[s].compute_impulse_forward_dynamics();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_dynamics::Skeleton;

    fn skeletons(n: usize) -> Vec<Skeleton> {
        (0..n).map(|i| Skeleton::new(&format!("s{i}"))).collect()
    }

    #[test]
    fn union_find_merges_by_size() {
        let mut skels = skeletons(4);
        reset_union(&mut skels);
        unite(&mut skels, 0, 1);
        unite(&mut skels, 2, 3);
        unite(&mut skels, 1, 3);
        let root = compress_path(&mut skels, 0);
        for i in 0..4 {
            assert_eq!(compress_path(&mut skels, i), root);
        }
        assert_eq!(skels[root].union_size, 4);
    }

    #[test]
    fn union_reset_restores_singletons() {
        let mut skels = skeletons(3);
        reset_union(&mut skels);
        unite(&mut skels, 0, 2);
        reset_union(&mut skels);
        for (i, s) in skels.iter().enumerate() {
            assert_eq!(s.union_root, i);
            assert_eq!(s.union_size, 1);
        }
    }
}
