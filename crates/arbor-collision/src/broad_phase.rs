//! Broad-phase collision detection using sweep-and-prune.

use crate::shape::Aabb;

/// Potential collision pair (indices into the AABB list).
pub type CollisionPair = (usize, usize);

/// Endpoint for sweep-and-prune.
#[derive(Clone, Copy)]
struct Endpoint {
    value: f64,
    idx: usize,
    is_min: bool,
}

/// Sweep-and-prune along the X axis, confirming candidates on the other
/// two axes. Returns index pairs with overlapping AABBs, `(low, high)`
/// ordered.
pub fn sweep_and_prune(aabbs: &[Aabb]) -> Vec<CollisionPair> {
    if aabbs.len() < 2 {
        return Vec::new();
    }

    let mut endpoints: Vec<Endpoint> = Vec::with_capacity(aabbs.len() * 2);
    for (i, aabb) in aabbs.iter().enumerate() {
        endpoints.push(Endpoint {
            value: aabb.min.x,
            idx: i,
            is_min: true,
        });
        endpoints.push(Endpoint {
            value: aabb.max.x,
            idx: i,
            is_min: false,
        });
    }
    endpoints.sort_by(|a, b| a.value.total_cmp(&b.value));

    let mut pairs = Vec::new();
    let mut active: Vec<usize> = Vec::new();
    for ep in endpoints {
        if ep.is_min {
            for &other in &active {
                if aabbs[ep.idx].overlaps(&aabbs[other]) {
                    pairs.push(if ep.idx < other {
                        (ep.idx, other)
                    } else {
                        (other, ep.idx)
                    });
                }
            }
            active.push(ep.idx);
        } else {
            active.retain(|&x| x != ep.idx);
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_math::Vec3;

    #[test]
    fn no_overlap() {
        let aabbs = vec![
            Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)),
            Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0)),
        ];
        assert!(sweep_and_prune(&aabbs).is_empty());
    }

    #[test]
    fn overlapping_pair() {
        let aabbs = vec![
            Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.5, 1.0, 1.0)),
            Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0)),
        ];
        let pairs = sweep_and_prune(&aabbs);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn x_overlap_rejected_on_y() {
        let aabbs = vec![
            Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)),
            Aabb::new(Vec3::new(0.5, 5.0, 0.0), Vec3::new(1.5, 6.0, 1.0)),
        ];
        assert!(sweep_and_prune(&aabbs).is_empty());
    }
}
