//! Ray representation for the path-tracing kernel.
//!
//! A ray is r(t) = origin + t * direction. The reciprocal direction is cached
//! because every BVH node visit runs a slab test against it.

use glam::{Mat4, Vec3A};

/// Ray in 3D space with a cached reciprocal direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Starting point of the ray.
    pub origin: Vec3A,
    /// Unit direction of the ray.
    pub direction: Vec3A,
    /// Component-wise reciprocal of `direction`, used by the slab test.
    pub inv_direction: Vec3A,
}

impl Ray {
    /// Create a new ray; `direction` is normalized.
    pub fn new(origin: Vec3A, direction: Vec3A) -> Self {
        let direction = direction.normalize();
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Compute a point at parameter t along the ray.
    pub fn at(&self, t: f32) -> Vec3A {
        self.origin + t * self.direction
    }

    /// Replace the direction, keeping the reciprocal in sync.
    pub fn set_direction(&mut self, direction: Vec3A) {
        self.direction = direction.normalize();
        self.inv_direction = self.direction.recip();
    }

    /// Move the ray into the space described by `matrix` (usually an
    /// instance's inverse transform). The direction is renormalized, so
    /// distances along the returned ray are in the target space's units.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::new(
            matrix.transform_point3a(self.origin),
            matrix.transform_vector3a(self.direction),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_direction_tracks_direction() {
        let mut ray = Ray::new(Vec3A::ZERO, Vec3A::new(0.0, 2.0, 0.0));
        assert_eq!(ray.direction, Vec3A::Y);
        assert_eq!(ray.inv_direction.y, 1.0);
        assert!(ray.inv_direction.x.is_infinite());

        ray.set_direction(Vec3A::new(-4.0, 0.0, 0.0));
        assert_eq!(ray.inv_direction.x, -1.0);
    }

    #[test]
    fn transformed_ray_lands_in_object_space() {
        let to_object = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -5.0)).inverse();
        let ray = Ray::new(Vec3A::ZERO, Vec3A::NEG_Z).transformed(&to_object);
        assert!((ray.origin - Vec3A::new(0.0, 0.0, 5.0)).length() < 1e-6);
        assert!((ray.at(5.0)).length() < 1e-6);
    }
}
