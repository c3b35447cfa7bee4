//! Collision detection for the arbor physics engine.
//!
//! Narrow phase is a dispatch table over shape pairs: sphere–sphere and
//! shape–plane queries use closed forms, box–box uses the separating-axis
//! theorem, and everything else goes through MPR (Minkowski Portal
//! Refinement) driving the shared support/center functions.

pub mod broad_phase;
pub mod dispatch;
pub mod mpr;
pub mod shape;

pub use broad_phase::sweep_and_prune;
pub use dispatch::{collide, ContactPoint};
pub use mpr::{mpr_intersect, mpr_penetration, MprOptions};
pub use shape::{Aabb, Shape, ShapeNode};

use arbor_math::Vec3;

/// A contact produced by the narrow phase, tagged with the owning bodies.
///
/// The normal points from body 2 toward body 1; `depth` is positive when
/// the shapes interpenetrate.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Contact point in world coordinates.
    pub point: Vec3,
    /// Unit contact normal, from body 2 toward body 1.
    pub normal: Vec3,
    /// Penetration depth (positive = penetrating).
    pub depth: f64,
    /// Skeleton index of the first body.
    pub skeleton1: usize,
    /// Body node index of the first body within its skeleton.
    pub body1: usize,
    /// Skeleton index of the second body.
    pub skeleton2: usize,
    /// Body node index of the second body within its skeleton.
    pub body2: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_math::Transform;

    #[test]
    fn sphere_sphere_separated() {
        let s = Shape::Sphere { radius: 1.0 };
        let t1 = Transform::identity();
        let t2 = Transform::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let contacts = collide(&s, &t1, &s, &t2, &MprOptions::default());
        assert!(contacts.is_empty());
    }

    #[test]
    fn sphere_sphere_penetrating() {
        let s = Shape::Sphere { radius: 1.0 };
        let t1 = Transform::identity();
        let t2 = Transform::from_translation(Vec3::new(1.5, 0.0, 0.0));
        let contacts = collide(&s, &t1, &s, &t2, &MprOptions::default());
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert!((c.depth - 0.5).abs() < 1e-9, "depth = {}", c.depth);
        // Normal points from shape 2 toward shape 1.
        assert!((c.normal - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1e-9);
    }
}
