//! Top-level acceleration structure over mesh instances.
//!
//! Rebuilt from scratch whenever an instance transform changes. Splits at the
//! median along the widest axis; each leaf holds exactly one instance.

use super::{Aabb, BvhNode};
use glam::Vec3;

#[derive(Clone, Debug, Default)]
pub struct Tlas {
    /// Depth-first nodes, root at index 0. Empty when there are no instances.
    pub nodes: Vec<BvhNode>,
    /// `order[k]` is the caller's instance index stored at leaf slot `k`.
    /// Instances must be uploaded in this order.
    pub order: Vec<u32>,
}

struct Builder<'a> {
    nodes: Vec<BvhNode>,
    order: Vec<u32>,
    bounds: &'a [Aabb],
    centers: Vec<Vec3>,
}

/// Build over per-instance world bounds.
pub fn build(instance_bounds: &[Aabb]) -> Tlas {
    if instance_bounds.is_empty() {
        return Tlas::default();
    }
    let mut builder = Builder {
        nodes: Vec::with_capacity(2 * instance_bounds.len() - 1),
        order: (0..instance_bounds.len() as u32).collect(),
        bounds: instance_bounds,
        centers: instance_bounds.iter().map(Aabb::center).collect(),
    };
    builder.subdivide(0, instance_bounds.len());
    Tlas {
        nodes: builder.nodes,
        order: builder.order,
    }
}

impl Builder<'_> {
    fn subdivide(&mut self, first: usize, count: usize) -> usize {
        let mut bounds = Aabb::empty();
        let mut centroids = Aabb::empty();
        for &i in &self.order[first..first + count] {
            bounds = bounds.union(&self.bounds[i as usize]);
            centroids.grow(self.centers[i as usize]);
        }

        let index = self.nodes.len();
        self.nodes.push(BvhNode::leaf(bounds, first as u32, count as u32));
        if count == 1 {
            return index;
        }

        let axis = centroids.longest_axis();
        let centers = &self.centers;
        let mid = count / 2;
        self.order[first..first + count].select_nth_unstable_by(mid, |&a, &b| {
            centers[a as usize][axis].total_cmp(&centers[b as usize][axis])
        });

        self.subdivide(first, mid);
        let right = self.subdivide(first + mid, count - mid);
        self.nodes[index] = BvhNode::internal(bounds, (right - index) as u32);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::walk;

    fn unit_at(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn empty_scene_has_no_nodes() {
        let tlas = build(&[]);
        assert!(tlas.nodes.is_empty());
        assert!(tlas.order.is_empty());
    }

    #[test]
    fn single_instance_is_root_leaf() {
        let tlas = build(&[unit_at(3.0)]);
        assert_eq!(tlas.nodes.len(), 1);
        assert!(tlas.nodes[0].is_leaf());
        assert_eq!(tlas.order, vec![0]);
    }

    #[test]
    fn leaves_hold_one_instance_each() {
        let bounds: Vec<Aabb> = [5.0, -2.0, 9.0, 0.5, 3.0, -7.0, 1.0].map(unit_at).to_vec();
        let tlas = build(&bounds);
        assert_eq!(tlas.nodes.len(), 2 * bounds.len() - 1);

        let mut slots = Vec::new();
        walk(&tlas.nodes, 0, |index, node| match node.children(index) {
            Some((l, r)) => {
                assert!(node.bounds().contains(&tlas.nodes[l].bounds()));
                assert!(node.bounds().contains(&tlas.nodes[r].bounds()));
            }
            None => {
                assert_eq!(node.primitive_count, 1);
                let instance = tlas.order[node.start as usize] as usize;
                assert!(node.bounds().contains(&bounds[instance]));
                slots.push(node.start);
            }
        });
        slots.sort();
        assert_eq!(slots, (0..bounds.len() as u32).collect::<Vec<_>>());
    }
}
