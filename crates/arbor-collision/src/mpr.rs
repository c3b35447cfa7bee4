//! Minkowski Portal Refinement over support functions.
//!
//! Penetration queries return `(depth, direction, point)` where the
//! direction is the minimal-translation direction for the first shape;
//! callers negate it to obtain the contact normal pointing from shape 2
//! toward shape 1.

use crate::shape::Shape;
use arbor_math::{Transform, Vec3};

/// MPR iteration controls.
#[derive(Debug, Clone, Copy)]
pub struct MprOptions {
    /// Refinement stops once the portal is this close to the surface.
    pub tolerance: f64,
    /// Hard cap on portal discovery/refinement iterations.
    pub max_iterations: usize,
}

impl Default for MprOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 500,
        }
    }
}

/// A point of the Minkowski difference with its witness points.
#[derive(Debug, Clone, Copy)]
struct SupportPoint {
    /// Point of the difference: `v1 - v2`.
    v: Vec3,
    /// Witness on shape 1.
    v1: Vec3,
    /// Witness on shape 2.
    v2: Vec3,
}

struct Pair<'a> {
    s1: &'a Shape,
    t1: &'a Transform,
    s2: &'a Shape,
    t2: &'a Transform,
}

impl Pair<'_> {
    fn support(&self, dir: &Vec3) -> SupportPoint {
        let v1 = self.s1.support(dir, self.t1);
        let v2 = self.s2.support(&-dir, self.t2);
        SupportPoint { v: v1 - v2, v1, v2 }
    }

    fn center(&self) -> SupportPoint {
        let v1 = self.s1.center(self.t1);
        let v2 = self.s2.center(self.t2);
        SupportPoint { v: v1 - v2, v1, v2 }
    }
}

enum Discovery {
    Miss,
    /// Origin lies on the center ray; contact without measurable depth.
    Touching,
    Portal([SupportPoint; 4]),
}

fn discover_portal(pair: &Pair, opts: &MprOptions) -> Discovery {
    let mut v0 = pair.center();
    if v0.v.norm() < 1e-10 {
        // Coincident centers: nudge so the origin ray is well defined.
        v0.v = Vec3::new(1e-8, 0.0, 0.0);
    }

    let dir = (-v0.v).normalize();
    let mut v1 = pair.support(&dir);
    if v1.v.dot(&dir) < 0.0 {
        return Discovery::Miss;
    }

    let dir = v0.v.cross(&v1.v);
    if dir.norm() < 1e-10 {
        return Discovery::Touching;
    }
    let dir = dir.normalize();
    let mut v2 = pair.support(&dir);
    if v2.v.dot(&dir) < 0.0 {
        return Discovery::Miss;
    }

    let mut dir = (v1.v - v0.v).cross(&(v2.v - v0.v)).normalize();
    if dir.dot(&v0.v) > 0.0 {
        std::mem::swap(&mut v1, &mut v2);
        dir = -dir;
    }

    for _ in 0..opts.max_iterations {
        let v3 = pair.support(&dir);
        if v3.v.dot(&dir) < 0.0 {
            return Discovery::Miss;
        }
        // Keep the origin inside the candidate portal cone.
        if v1.v.cross(&v3.v).dot(&v0.v) < 0.0 {
            v2 = v3;
            dir = (v1.v - v0.v).cross(&(v2.v - v0.v)).normalize();
            continue;
        }
        if v3.v.cross(&v2.v).dot(&v0.v) < 0.0 {
            v1 = v3;
            dir = (v1.v - v0.v).cross(&(v2.v - v0.v)).normalize();
            continue;
        }
        return Discovery::Portal([v0, v1, v2, v3]);
    }
    Discovery::Miss
}

fn portal_dir(p: &[SupportPoint; 4]) -> Vec3 {
    (p[2].v - p[1].v).cross(&(p[3].v - p[1].v)).normalize()
}

fn expand_portal(p: &mut [SupportPoint; 4], v4: SupportPoint) {
    let v4v0 = v4.v.cross(&p[0].v);
    if p[1].v.dot(&v4v0) > 0.0 {
        if p[2].v.dot(&v4v0) > 0.0 {
            p[1] = v4;
        } else {
            p[3] = v4;
        }
    } else if p[3].v.dot(&v4v0) > 0.0 {
        p[2] = v4;
    } else {
        p[1] = v4;
    }
}

fn portal_reached_tolerance(p: &[SupportPoint; 4], v4: &SupportPoint, dir: &Vec3, tol: f64) -> bool {
    let d4 = v4.v.dot(dir);
    let reach = (d4 - p[1].v.dot(dir))
        .min(d4 - p[2].v.dot(dir))
        .min(d4 - p[3].v.dot(dir));
    reach < tol
}

/// Boolean intersection query.
pub fn mpr_intersect(
    s1: &Shape,
    t1: &Transform,
    s2: &Shape,
    t2: &Transform,
    opts: &MprOptions,
) -> bool {
    let pair = Pair { s1, t1, s2, t2 };
    let mut portal = match discover_portal(&pair, opts) {
        Discovery::Miss => return false,
        Discovery::Touching => return true,
        Discovery::Portal(p) => p,
    };

    for _ in 0..opts.max_iterations {
        let dir = portal_dir(&portal);
        if portal[1].v.dot(&dir) >= 0.0 {
            // Portal plane at or beyond the origin.
            return true;
        }
        let v4 = pair.support(&dir);
        if v4.v.dot(&dir) < 0.0 || portal_reached_tolerance(&portal, &v4, &dir, opts.tolerance) {
            return false;
        }
        expand_portal(&mut portal, v4);
    }
    false
}

/// Penetration query: `(depth, direction, point)` for overlapping shapes,
/// `None` when separated or when refinement fails to converge.
pub fn mpr_penetration(
    s1: &Shape,
    t1: &Transform,
    s2: &Shape,
    t2: &Transform,
    opts: &MprOptions,
) -> Option<(f64, Vec3, Vec3)> {
    let pair = Pair { s1, t1, s2, t2 };
    let mut portal = match discover_portal(&pair, opts) {
        Discovery::Miss => return None,
        Discovery::Touching => return None,
        Discovery::Portal(p) => p,
    };

    for _ in 0..opts.max_iterations {
        let dir = portal_dir(&portal);
        let v4 = pair.support(&dir);
        if v4.v.dot(&dir) < 0.0 {
            // Origin outside the support plane: shapes are separated.
            return None;
        }
        if portal_reached_tolerance(&portal, &v4, &dir, opts.tolerance) {
            let witness =
                closest_point_on_triangle(&Vec3::zeros(), &portal[1].v, &portal[2].v, &portal[3].v);
            let depth = witness.norm();
            let pen_dir = if depth > 1e-12 {
                witness / depth
            } else {
                dir
            };
            let pos = penetration_position(&portal, &pen_dir);
            return Some((depth, pen_dir, pos));
        }
        expand_portal(&mut portal, v4);
    }

    log::warn!("MPR penetration refinement hit the iteration cap; treating pair as separated");
    None
}

/// Barycentric blend of the portal witness points.
fn penetration_position(p: &[SupportPoint; 4], dir: &Vec3) -> Vec3 {
    let (v0, v1, v2, v3) = (&p[0].v, &p[1].v, &p[2].v, &p[3].v);
    let mut b0 = v1.cross(v2).dot(v3);
    let mut b1 = v3.cross(v2).dot(v0);
    let mut b2 = v0.cross(v1).dot(v3);
    let mut b3 = v2.cross(v1).dot(v0);
    let mut sum = b0 + b1 + b2 + b3;

    if sum <= 0.0 {
        // Degenerate tetrahedron: weight the portal triangle only.
        b0 = 0.0;
        b1 = v2.cross(v3).dot(dir);
        b2 = v3.cross(v1).dot(dir);
        b3 = v1.cross(v2).dot(dir);
        sum = b1 + b2 + b3;
    }
    if sum.abs() < 1e-15 {
        return (p[1].v1 + p[1].v2) * 0.5;
    }

    let inv = 1.0 / sum;
    let p1 = (p[0].v1 * b0 + p[1].v1 * b1 + p[2].v1 * b2 + p[3].v1 * b3) * inv;
    let p2 = (p[0].v2 * b0 + p[1].v2 * b1 + p[2].v2 * b2 + p[3].v2 * b3) * inv;
    (p1 + p2) * 0.5
}

/// Closest point on triangle `abc` to point `p`.
fn closest_point_on_triangle(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return a + ab * t;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return a + ac * t;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * t;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_math::exp_map_rot;

    #[test]
    fn spheres_intersecting() {
        let s = Shape::Sphere { radius: 1.0 };
        let t1 = Transform::identity();
        let t2 = Transform::from_translation(Vec3::new(1.2, 0.0, 0.0));
        let opts = MprOptions::default();
        assert!(mpr_intersect(&s, &t1, &s, &t2, &opts));

        let (depth, dir, _pos) = mpr_penetration(&s, &t1, &s, &t2, &opts).unwrap();
        assert!((depth - 0.8).abs() < 1e-3, "depth = {depth}");
        // Penetration direction points from shape 1 toward shape 2.
        assert!(dir.x > 0.99, "dir = {dir:?}");
    }

    #[test]
    fn spheres_separated() {
        let s = Shape::Sphere { radius: 1.0 };
        let t1 = Transform::identity();
        let t2 = Transform::from_translation(Vec3::new(2.5, 0.0, 0.0));
        let opts = MprOptions::default();
        assert!(!mpr_intersect(&s, &t1, &s, &t2, &opts));
        assert!(mpr_penetration(&s, &t1, &s, &t2, &opts).is_none());
    }

    #[test]
    fn box_capsule_overlap() {
        let b = Shape::Box {
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        };
        let c = Shape::Capsule {
            radius: 0.5,
            half_length: 1.0,
        };
        let t1 = Transform::identity();
        let t2 = Transform::new(
            exp_map_rot(&Vec3::new(0.3, 0.2, 0.0)),
            Vec3::new(0.0, 0.0, 2.2),
        );
        let opts = MprOptions::default();
        assert!(mpr_intersect(&b, &t1, &c, &t2, &opts));
        let (depth, _, pos) = mpr_penetration(&b, &t1, &c, &t2, &opts).unwrap();
        assert!(depth > 0.0 && depth < 1.0, "depth = {depth}");
        assert!(pos.z > 0.5 && pos.z < 1.6, "pos = {pos:?}");
    }

    #[test]
    fn closest_point_inside_face() {
        let p = closest_point_on_triangle(
            &Vec3::new(0.1, 0.1, 5.0),
            &Vec3::new(0.0, 0.0, 0.0),
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 1.0, 0.0),
        );
        assert!((p - Vec3::new(0.1, 0.1, 0.0)).norm() < 1e-12);
    }
}
