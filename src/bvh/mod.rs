//! Two-level bounding volume hierarchy.
//!
//! Both levels share one flattened node type. Nodes are stored depth-first:
//! the left child of an internal node sits at `index + 1` and the right child
//! at `index + right_offset`. A `right_offset` of zero marks a leaf whose
//! primitives are `start .. start + primitive_count`.
//!
//! - [`blas`] builds one tree per mesh over its triangles, in object space.
//! - [`tlas`] builds one tree over the world-space bounds of all instances.

pub mod blas;
pub mod tlas;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted box that any `grow`/`union` replaces.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Surface area, zero for empty boxes.
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Axis of greatest extent (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    #[cfg(test)]
    pub fn contains(&self, other: &Aabb) -> bool {
        other.is_empty() || (self.min.cmple(other.min).all() && self.max.cmpge(other.max).all())
    }

    #[cfg(test)]
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    /// Bounds of this box after an affine transform (all eight corners).
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.grow(matrix.transform_point3(corner));
        }
        out
    }

    /// Pad flat dimensions so the slab test never sees a zero-width box.
    pub fn padded(&self, epsilon: f32) -> Aabb {
        let size = self.extent();
        let pad = Vec3::new(
            if size.x < epsilon { epsilon } else { 0.0 },
            if size.y < epsilon { epsilon } else { 0.0 },
            if size.z < epsilon { epsilon } else { 0.0 },
        ) * 0.5;
        Aabb {
            min: self.min - pad,
            max: self.max + pad,
        }
    }
}

/// Flattened BVH node shared by BLAS and TLAS, laid out for the device.
///
/// 48 bytes: `bbox_min` and `start` fill the first 16-byte row, `bbox_max`
/// and `primitive_count` the second, `right_offset` plus padding the third.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub bbox_min: [f32; 3],
    /// First primitive (leaf) relative to the owner's primitive range
    pub start: u32,
    pub bbox_max: [f32; 3],
    /// Number of primitives in a leaf, 0 for internal nodes
    pub primitive_count: u32,
    /// Distance to the right child, 0 for leaves
    pub right_offset: u32,
    pub _padding: [u32; 3],
}

impl BvhNode {
    pub fn leaf(bounds: Aabb, start: u32, primitive_count: u32) -> Self {
        Self {
            bbox_min: bounds.min.to_array(),
            start,
            bbox_max: bounds.max.to_array(),
            primitive_count,
            right_offset: 0,
            _padding: [0; 3],
        }
    }

    pub fn internal(bounds: Aabb, right_offset: u32) -> Self {
        Self {
            bbox_min: bounds.min.to_array(),
            start: 0,
            bbox_max: bounds.max.to_array(),
            primitive_count: 0,
            right_offset,
            _padding: [0; 3],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.right_offset == 0
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::from_array(self.bbox_min), Vec3::from_array(self.bbox_max))
    }

    /// Indices of the two children of an internal node.
    #[cfg(test)]
    pub fn children(&self, index: usize) -> Option<(usize, usize)> {
        (!self.is_leaf()).then(|| (index + 1, index + self.right_offset as usize))
    }
}

/// Visit every node of the subtree rooted at `root`, depth-first.
#[cfg(test)]
pub fn walk(nodes: &[BvhNode], root: usize, mut visit: impl FnMut(usize, &BvhNode)) {
    let mut stack = vec![root];
    while let Some(index) = stack.pop() {
        let node = &nodes[index];
        visit(index, node);
        if let Some((left, right)) = node.children(index) {
            stack.push(right);
            stack.push(left);
        }
    }
}
