//! Bottom-level acceleration structure: one binned-SAH tree per mesh.

use super::{Aabb, BvhNode};
use crate::scene::{Triangle, Vertex};
use glam::Vec3;

const BINS: usize = 16;
/// Leaves never hold more triangles than this.
pub const MAX_LEAF_SIZE: usize = 4;
const FLAT_EPSILON: f32 = 1e-5;

/// Result of building one mesh's tree.
#[derive(Clone, Debug, Default)]
pub struct Blas {
    /// Depth-first nodes, root at index 0
    pub nodes: Vec<BvhNode>,
    /// Object-space bounds of the whole mesh
    pub bounds: Aabb,
}

#[derive(Clone, Copy, Default)]
struct Bin {
    bounds: Option<Aabb>,
    count: usize,
}

struct Builder {
    nodes: Vec<BvhNode>,
    order: Vec<usize>,
    tri_bounds: Vec<Aabb>,
    tri_centers: Vec<Vec3>,
}

/// Build the BLAS for a mesh and reorder `triangles` in place so every leaf
/// covers a contiguous run. Leaf `start` values are relative to the first
/// triangle of the slice.
pub fn build(vertices: &[Vertex], triangles: &mut [Triangle]) -> Blas {
    if triangles.is_empty() {
        return Blas::default();
    }

    let mut tri_bounds = Vec::with_capacity(triangles.len());
    let mut tri_centers = Vec::with_capacity(triangles.len());
    for triangle in triangles.iter() {
        let mut bounds = Aabb::empty();
        for &index in &triangle.indices {
            bounds.grow(vertices[index as usize].position);
        }
        let bounds = bounds.padded(FLAT_EPSILON);
        tri_centers.push(bounds.center());
        tri_bounds.push(bounds);
    }

    let mut builder = Builder {
        nodes: Vec::with_capacity(2 * triangles.len() / MAX_LEAF_SIZE + 1),
        order: (0..triangles.len()).collect(),
        tri_bounds,
        tri_centers,
    };
    builder.subdivide(0, triangles.len());

    let reordered: Vec<Triangle> = builder.order.iter().map(|&i| triangles[i]).collect();
    triangles.copy_from_slice(&reordered);

    let bounds = builder.nodes[0].bounds();
    Blas {
        nodes: builder.nodes,
        bounds,
    }
}

impl Builder {
    fn range_bounds(&self, first: usize, count: usize) -> (Aabb, Aabb) {
        let mut bounds = Aabb::empty();
        let mut centroids = Aabb::empty();
        for &tri in &self.order[first..first + count] {
            bounds = bounds.union(&self.tri_bounds[tri]);
            centroids.grow(self.tri_centers[tri]);
        }
        (bounds, centroids)
    }

    /// Emit the subtree for `order[first..first + count]` and return its index.
    fn subdivide(&mut self, first: usize, count: usize) -> usize {
        let (bounds, centroids) = self.range_bounds(first, count);
        let index = self.nodes.len();
        self.nodes
            .push(BvhNode::leaf(bounds, first as u32, count as u32));
        if count <= MAX_LEAF_SIZE {
            return index;
        }

        let split = self
            .binned_split(first, count, &centroids)
            .unwrap_or_else(|| self.median_split(first, count, &centroids));

        self.subdivide(first, split - first);
        let right = self.subdivide(split, first + count - split);
        self.nodes[index] = BvhNode::internal(bounds, (right - index) as u32);
        index
    }

    /// Partition by the cheapest of the `BINS - 1` bin boundaries on the
    /// widest centroid axis. Returns the first index of the right half.
    fn binned_split(&mut self, first: usize, count: usize, centroids: &Aabb) -> Option<usize> {
        let axis = centroids.longest_axis();
        let axis_min = centroids.min[axis];
        let axis_len = centroids.extent()[axis];
        if axis_len < 1e-6 {
            return None;
        }
        let scale = BINS as f32 / axis_len;
        let bin_of = |c: Vec3| (((c[axis] - axis_min) * scale) as usize).min(BINS - 1);

        let mut bins = [Bin::default(); BINS];
        for &tri in &self.order[first..first + count] {
            let bin = &mut bins[bin_of(self.tri_centers[tri])];
            bin.count += 1;
            let b = self.tri_bounds[tri];
            bin.bounds = Some(bin.bounds.map_or(b, |acc| acc.union(&b)));
        }

        let mut left_area = [0.0f32; BINS];
        let mut left_count = [0usize; BINS];
        let mut acc = Aabb::empty();
        let mut sum = 0;
        for i in 0..BINS {
            sum += bins[i].count;
            if let Some(b) = bins[i].bounds {
                acc = acc.union(&b);
            }
            left_area[i] = acc.area();
            left_count[i] = sum;
        }

        let mut best: Option<(usize, f32)> = None;
        let mut acc = Aabb::empty();
        let mut sum = 0;
        for i in (1..BINS).rev() {
            sum += bins[i].count;
            if let Some(b) = bins[i].bounds {
                acc = acc.union(&b);
            }
            let left = left_count[i - 1];
            if left == 0 || sum == 0 {
                continue;
            }
            let cost = left_area[i - 1] * left as f32 + acc.area() * sum as f32;
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((i - 1, cost));
            }
        }
        let (split_bin, _) = best?;

        let centers = &self.tri_centers;
        let range = &mut self.order[first..first + count];
        let mut left = 0;
        for i in 0..range.len() {
            if bin_of(centers[range[i]]) <= split_bin {
                range.swap(i, left);
                left += 1;
            }
        }
        (left > 0 && left < count).then_some(first + left)
    }

    /// Fallback when centroids coincide: split the range in half along the
    /// widest axis so leaves still respect `MAX_LEAF_SIZE`.
    fn median_split(&mut self, first: usize, count: usize, centroids: &Aabb) -> usize {
        let axis = centroids.longest_axis();
        let centers = &self.tri_centers;
        let mid = count / 2;
        self.order[first..first + count].select_nth_unstable_by(mid, |&a, &b| {
            centers[a][axis].total_cmp(&centers[b][axis])
        });
        first + mid
    }
}
