//! Narrow-phase dispatch over shape pairs.
//!
//! Sphere–sphere and shape–plane pairs use closed forms, box–box uses the
//! separating-axis theorem, and every remaining convex pair goes through
//! MPR. All contact normals point from the second shape toward the first.

use crate::mpr::{mpr_penetration, MprOptions};
use crate::shape::Shape;
use arbor_math::{Transform, Vec3};

/// A single narrow-phase contact, not yet tagged with body ownership.
#[derive(Debug, Clone)]
pub struct ContactPoint {
    /// Contact point in world coordinates.
    pub point: Vec3,
    /// Unit normal from shape 2 toward shape 1.
    pub normal: Vec3,
    /// Penetration depth (positive).
    pub depth: f64,
}

/// Collide two posed shapes. Returns zero or more contacts.
pub fn collide(
    s1: &Shape,
    t1: &Transform,
    s2: &Shape,
    t2: &Transform,
    opts: &MprOptions,
) -> Vec<ContactPoint> {
    match (s1, s2) {
        (Shape::Plane { .. }, Shape::Plane { .. }) => Vec::new(),
        (Shape::Plane { .. }, _) => {
            // Keep the plane on the right; flip normals back afterwards.
            let mut contacts = collide(s2, t2, s1, t1, opts);
            for c in &mut contacts {
                c.normal = -c.normal;
            }
            contacts
        }
        (_, Shape::Plane { normal }) => collide_with_plane(s1, t1, normal, t2),
        (Shape::Sphere { radius: r1 }, Shape::Sphere { radius: r2 }) => {
            collide_sphere_sphere(*r1, t1, *r2, t2)
        }
        (
            Shape::Box {
                half_extents: he1, ..
            },
            Shape::Box {
                half_extents: he2, ..
            },
        ) => collide_box_box(he1, t1, he2, t2),
        _ => collide_mpr(s1, t1, s2, t2, opts),
    }
}

fn collide_sphere_sphere(r1: f64, t1: &Transform, r2: f64, t2: &Transform) -> Vec<ContactPoint> {
    let delta = t1.pos - t2.pos;
    let dist = delta.norm();
    let depth = r1 + r2 - dist;
    if depth <= 0.0 {
        return Vec::new();
    }
    let normal = if dist > 1e-12 { delta / dist } else { Vec3::z() };
    let point = (t1.pos - normal * r1 + t2.pos + normal * r2) * 0.5;
    vec![ContactPoint {
        point,
        normal,
        depth,
    }]
}

/// Closed-form collision of a convex shape against a plane.
///
/// Boxes emit one contact per penetrating corner so resting contact is
/// well conditioned; capsules emit one per cap; spheres and the remaining
/// convex shapes emit their single deepest point via the support function.
fn collide_with_plane(s1: &Shape, t1: &Transform, plane_normal: &Vec3, t2: &Transform) -> Vec<ContactPoint> {
    let n = t2.rotate(plane_normal);
    let offset = n.dot(&t2.pos);
    let mut contacts = Vec::new();

    match s1 {
        Shape::Sphere { radius } => {
            let dist = n.dot(&t1.pos) - offset;
            let depth = radius - dist;
            if depth > 0.0 {
                contacts.push(ContactPoint {
                    point: t1.pos - n * *radius,
                    normal: n,
                    depth,
                });
            }
        }
        Shape::Box { half_extents } => {
            for sx in [-1.0, 1.0] {
                for sy in [-1.0, 1.0] {
                    for sz in [-1.0, 1.0] {
                        let corner = t1.transform_point(&Vec3::new(
                            sx * half_extents.x,
                            sy * half_extents.y,
                            sz * half_extents.z,
                        ));
                        let depth = offset - n.dot(&corner);
                        if depth > 0.0 {
                            contacts.push(ContactPoint {
                                point: corner,
                                normal: n,
                                depth,
                            });
                        }
                    }
                }
            }
        }
        Shape::Capsule {
            radius,
            half_length,
        } => {
            let axis = t1.rotate(&Vec3::z());
            for end in [t1.pos + axis * *half_length, t1.pos - axis * *half_length] {
                let depth = radius - (n.dot(&end) - offset);
                if depth > 0.0 {
                    contacts.push(ContactPoint {
                        point: end - n * *radius,
                        normal: n,
                        depth,
                    });
                }
            }
        }
        _ => {
            // Deepest point through the support function.
            let p = s1.support(&-n, t1);
            let depth = offset - n.dot(&p);
            if depth > 0.0 {
                contacts.push(ContactPoint {
                    point: p,
                    normal: n,
                    depth,
                });
            }
        }
    }
    contacts
}

/// Separating-axis test for a pair of oriented boxes: 3 + 3 face axes and
/// 9 edge-edge cross products. Edge axes only win over face axes when the
/// penetration improvement is significant, since edge contacts are less
/// stable.
fn collide_box_box(
    he1: &Vec3,
    t1: &Transform,
    he2: &Vec3,
    t2: &Transform,
) -> Vec<ContactPoint> {
    let axes1 = [
        t1.rotate(&Vec3::x()),
        t1.rotate(&Vec3::y()),
        t1.rotate(&Vec3::z()),
    ];
    let axes2 = [
        t2.rotate(&Vec3::x()),
        t2.rotate(&Vec3::y()),
        t2.rotate(&Vec3::z()),
    ];
    let center_diff = t2.pos - t1.pos;

    let projected_radius = |axis: &Vec3, axes: &[Vec3; 3], he: &Vec3| -> f64 {
        he.x * axis.dot(&axes[0]).abs()
            + he.y * axis.dot(&axes[1]).abs()
            + he.z * axis.dot(&axes[2]).abs()
    };
    let test_axis = |axis: &Vec3| -> f64 {
        projected_radius(axis, &axes1, he1) + projected_radius(axis, &axes2, he2)
            - center_diff.dot(axis).abs()
    };

    let mut min_pen = f64::MAX;
    let mut best_axis = Vec3::x();

    for axis in axes1.iter().chain(axes2.iter()) {
        let pen = test_axis(axis);
        if pen <= 0.0 {
            return Vec::new();
        }
        if pen < min_pen {
            min_pen = pen;
            best_axis = *axis;
        }
    }

    for a1 in &axes1 {
        for a2 in &axes2 {
            let cross = a1.cross(a2);
            let len = cross.norm();
            if len < 1e-10 {
                continue;
            }
            let axis = cross / len;
            let pen = test_axis(&axis);
            if pen <= 0.0 {
                return Vec::new();
            }
            if pen < min_pen * 0.95 {
                min_pen = pen;
                best_axis = axis;
            }
        }
    }

    // Orient the normal from box 2 toward box 1.
    let normal = if best_axis.dot(&center_diff) > 0.0 {
        -best_axis
    } else {
        best_axis
    };

    let s1 = Shape::Box { half_extents: *he1 };
    let s2 = Shape::Box { half_extents: *he2 };
    let deepest1 = s1.support(&-normal, t1);
    let deepest2 = s2.support(&normal, t2);
    vec![ContactPoint {
        point: (deepest1 + deepest2) * 0.5,
        normal,
        depth: min_pen,
    }]
}

fn collide_mpr(
    s1: &Shape,
    t1: &Transform,
    s2: &Shape,
    t2: &Transform,
    opts: &MprOptions,
) -> Vec<ContactPoint> {
    match mpr_penetration(s1, t1, s2, t2, opts) {
        Some((depth, dir, point)) if depth > 0.0 => {
            vec![ContactPoint {
                point,
                // MPR reports the translation direction for shape 1; the
                // contact normal from shape 2 toward shape 1 is its negation.
                normal: -dir,
                depth,
            }]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_math::exp_map_rot;

    fn floor() -> (Shape, Transform) {
        (Shape::Plane { normal: Vec3::z() }, Transform::identity())
    }

    #[test]
    fn sphere_resting_on_plane() {
        let (plane, tp) = floor();
        let sphere = Shape::Sphere { radius: 0.5 };
        let ts = Transform::from_translation(Vec3::new(0.0, 0.0, 0.45));
        let contacts = collide(&sphere, &ts, &plane, &tp, &MprOptions::default());
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.05).abs() < 1e-12);
        assert!((contacts[0].normal - Vec3::z()).norm() < 1e-12);
    }

    #[test]
    fn plane_first_flips_normal() {
        let (plane, tp) = floor();
        let sphere = Shape::Sphere { radius: 0.5 };
        let ts = Transform::from_translation(Vec3::new(0.0, 0.0, 0.45));
        let contacts = collide(&plane, &tp, &sphere, &ts, &MprOptions::default());
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].normal + Vec3::z()).norm() < 1e-12);
    }

    #[test]
    fn box_on_plane_emits_corner_contacts() {
        let (plane, tp) = floor();
        let b = Shape::Box {
            half_extents: Vec3::new(0.5, 0.5, 0.5),
        };
        let tb = Transform::from_translation(Vec3::new(0.0, 0.0, 0.49));
        let contacts = collide(&b, &tb, &plane, &tp, &MprOptions::default());
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert!((c.depth - 0.01).abs() < 1e-12);
        }
    }

    #[test]
    fn tilted_plane_normal() {
        let tilt = exp_map_rot(&(Vec3::x() * 0.3));
        let plane = Shape::Plane { normal: Vec3::z() };
        let tp = Transform::from_rotation(tilt);
        let sphere = Shape::Sphere { radius: 0.5 };
        let n = tilt * Vec3::z();
        let ts = Transform::from_translation(n * 0.4);
        let contacts = collide(&sphere, &ts, &plane, &tp, &MprOptions::default());
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].normal - n).norm() < 1e-12);
        assert!((contacts[0].depth - 0.1).abs() < 1e-12);
    }

    #[test]
    fn boxes_face_contact() {
        let b = Shape::Box {
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        };
        let t1 = Transform::identity();
        let t2 = Transform::from_translation(Vec3::new(0.0, 0.0, 1.9));
        let contacts = collide(&b, &t1, &b, &t2, &MprOptions::default());
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.1).abs() < 1e-9);
        // Box 1 is below box 2: normal from 2 toward 1 points down.
        assert!(contacts[0].normal.z < -0.99);
    }

    #[test]
    fn boxes_separated() {
        let b = Shape::Box {
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        };
        let t1 = Transform::identity();
        let t2 = Transform::from_translation(Vec3::new(3.0, 0.0, 0.0));
        assert!(collide(&b, &t1, &b, &t2, &MprOptions::default()).is_empty());
    }

    #[test]
    fn cylinder_plane_uses_support_path() {
        let (plane, tp) = floor();
        let cyl = Shape::Cylinder {
            radius: 0.5,
            half_length: 1.0,
        };
        let tc = Transform::from_translation(Vec3::new(0.0, 0.0, 0.95));
        let contacts = collide(&cyl, &tc, &plane, &tp, &MprOptions::default());
        assert_eq!(contacts.len(), 1);
        assert!((contacts[0].depth - 0.05).abs() < 1e-9);
    }
}
