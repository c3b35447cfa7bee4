//! Collision shapes with support and center functions.

use arbor_math::{Transform, Vec3};

/// Convex collision shape primitives.
///
/// Capsules, cylinders, and cones are aligned with the local Z axis and
/// centered at the local origin. A plane passes through its frame origin
/// with the given outward normal and only collides through the dedicated
/// closed-form paths (it has no meaningful support point).
#[derive(Debug, Clone)]
pub enum Shape {
    /// Sphere with given radius.
    Sphere { radius: f64 },
    /// Box with half-extents.
    Box { half_extents: Vec3 },
    /// Capsule: segment of half-length along Z with spherical caps.
    Capsule { radius: f64, half_length: f64 },
    /// Cylinder along Z with the given half-length.
    Cylinder { radius: f64, half_length: f64 },
    /// Cone along Z: base of `radius` at -half_length, apex at +half_length.
    Cone { radius: f64, half_length: f64 },
    /// Convex hull of a vertex cloud (local coordinates).
    Convex { vertices: Vec<Vec3> },
    /// Infinite plane through the frame origin with outward normal.
    Plane { normal: Vec3 },
}

impl Shape {
    /// Support function: the point of the shape farthest along the world
    /// direction `dir`, for the shape posed at `tf`.
    ///
    /// The direction is rotated into the shape's local frame, the local
    /// support point computed, and the result transformed back to world.
    pub fn support(&self, dir: &Vec3, tf: &Transform) -> Vec3 {
        let d = tf.rot.transpose() * dir;
        let local = match self {
            Shape::Sphere { radius } => {
                let n = d.norm();
                if n > 1e-12 {
                    d * (*radius / n)
                } else {
                    Vec3::new(*radius, 0.0, 0.0)
                }
            }
            Shape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(d.x),
                half_extents.y.copysign(d.y),
                half_extents.z.copysign(d.z),
            ),
            Shape::Capsule {
                radius,
                half_length,
            } => {
                let tip = Vec3::new(0.0, 0.0, half_length.copysign(d.z));
                let n = d.norm();
                if n > 1e-12 {
                    tip + d * (*radius / n)
                } else {
                    tip + Vec3::new(*radius, 0.0, 0.0)
                }
            }
            Shape::Cylinder {
                radius,
                half_length,
            } => {
                let radial = (d.x * d.x + d.y * d.y).sqrt();
                if radial < 1e-12 {
                    // Degenerate direction along the axis: return the tip.
                    Vec3::new(0.0, 0.0, half_length.copysign(d.z))
                } else {
                    let r = *radius / radial;
                    Vec3::new(r * d.x, r * d.y, half_length.copysign(d.z))
                }
            }
            Shape::Cone {
                radius,
                half_length,
            } => {
                let radial2 = d.x * d.x + d.y * d.y;
                let len = (radial2 + d.z * d.z).sqrt();
                let radial = radial2.sqrt();
                let sin_a =
                    *radius / (radius * radius + 4.0 * half_length * half_length).sqrt();
                if d.z > len * sin_a {
                    Vec3::new(0.0, 0.0, *half_length)
                } else if radial > 1e-12 {
                    let r = *radius / radial;
                    Vec3::new(r * d.x, r * d.y, -*half_length)
                } else {
                    Vec3::new(0.0, 0.0, -*half_length)
                }
            }
            Shape::Convex { vertices } => {
                // Linear scan over vertices; callers with adjacency can
                // hill-climb instead.
                let centroid = convex_centroid(vertices);
                let mut best = vertices[0];
                let mut best_dot = d.dot(&(vertices[0] - centroid));
                for v in vertices.iter().skip(1) {
                    let dot = d.dot(&(v - centroid));
                    if dot > best_dot {
                        best = *v;
                        best_dot = dot;
                    }
                }
                best
            }
            Shape::Plane { normal } => {
                // Planes never reach MPR through the dispatch table; this
                // half-space support exists only to keep the interface total.
                let tangential = d - normal * normal.dot(&d);
                (tangential - normal) * 1e6
            }
        };
        tf.transform_point(&local)
    }

    /// Center function: an interior point of the shape in world coordinates.
    pub fn center(&self, tf: &Transform) -> Vec3 {
        match self {
            Shape::Convex { vertices } => tf.transform_point(&convex_centroid(vertices)),
            _ => tf.pos,
        }
    }

    /// World-space axis-aligned bounding box of the shape posed at `tf`.
    pub fn aabb(&self, tf: &Transform) -> Aabb {
        if let Shape::Plane { .. } = self {
            let large = 1e6;
            return Aabb::new(
                Vec3::new(-large, -large, -large),
                Vec3::new(large, large, large),
            );
        }
        let axes = [Vec3::x(), Vec3::y(), Vec3::z()];
        let mut min = Vec3::zeros();
        let mut max = Vec3::zeros();
        for (i, axis) in axes.iter().enumerate() {
            max[i] = self.support(axis, tf)[i];
            min[i] = self.support(&-axis, tf)[i];
        }
        Aabb::new(min, max)
    }
}

fn convex_centroid(vertices: &[Vec3]) -> Vec3 {
    let mut c = Vec3::zeros();
    for v in vertices {
        c += v;
    }
    c / vertices.len() as f64
}

/// A collision shape attached to a body node with a local offset.
#[derive(Debug, Clone)]
pub struct ShapeNode {
    pub shape: Shape,
    /// Pose of the shape in its body's frame.
    pub offset: Transform,
}

impl ShapeNode {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            offset: Transform::identity(),
        }
    }

    pub fn with_offset(shape: Shape, offset: Transform) -> Self {
        Self { shape, offset }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Check if two boxes overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use arbor_math::exp_map_rot;

    #[test]
    fn box_support_picks_signed_corner() {
        let b = Shape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let s = b.support(&Vec3::new(1.0, -1.0, 1.0), &Transform::identity());
        assert_relative_eq!(s, Vec3::new(1.0, -2.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn cylinder_axis_degenerate_direction() {
        let c = Shape::Cylinder {
            radius: 0.5,
            half_length: 2.0,
        };
        let s = c.support(&Vec3::new(0.0, 0.0, -1.0), &Transform::identity());
        assert_relative_eq!(s, Vec3::new(0.0, 0.0, -2.0), epsilon = 1e-12);
    }

    #[test]
    fn cone_apex_selection() {
        let c = Shape::Cone {
            radius: 1.0,
            half_length: 1.0,
        };
        // Straight up: apex.
        let s = c.support(&Vec3::z(), &Transform::identity());
        assert_relative_eq!(s, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        // Sideways: base rim.
        let s = c.support(&Vec3::x(), &Transform::identity());
        assert_relative_eq!(s, Vec3::new(1.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn support_respects_pose() {
        let b = Shape::Box {
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        };
        let tf = Transform::new(
            exp_map_rot(&Vec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2)),
            Vec3::new(10.0, 0.0, 0.0),
        );
        let s = b.support(&Vec3::x(), &tf);
        assert_relative_eq!(s.x, 11.0, epsilon = 1e-9);
    }

    #[test]
    fn aabb_of_rotated_box() {
        let b = Shape::Box {
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        };
        let tf = Transform::from_rotation(exp_map_rot(
            &(Vec3::z() * std::f64::consts::FRAC_PI_4),
        ));
        let aabb = b.aabb(&tf);
        let sqrt2 = std::f64::consts::SQRT_2;
        assert_relative_eq!(aabb.max.x, sqrt2, epsilon = 1e-9);
        assert_relative_eq!(aabb.max.z, 1.0, epsilon = 1e-9);
    }
}
