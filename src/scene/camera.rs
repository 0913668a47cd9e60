//! Thin-lens camera used to generate primary rays.

use glam::{Quat, Vec3};

/// Camera with an orthonormal forward/up basis.
///
/// Every mutating helper renormalizes the basis, so `forward`, `up` and
/// [`Camera::right`] always form a right-handed orthonormal frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Lens centre in world space
    pub position: Vec3,
    /// Viewing direction
    pub forward: Vec3,
    /// Image-space up direction
    pub up: Vec3,
    /// Horizontal field of view in radians
    pub fov: f32,
    /// Distance to the plane of perfect focus
    pub focal_distance: f32,
    /// Radius of the lens disk (0 = pinhole)
    pub aperture: f32,
    /// Radius of the positional jitter used for anti-aliasing
    pub blur: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 60f32.to_radians(),
            focal_distance: 10.0,
            aperture: 0.0,
            blur: 0.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, forward: Vec3, up: Vec3, fov: f32) -> Self {
        let mut camera = Self {
            position,
            forward,
            up,
            fov,
            ..Default::default()
        };
        camera.orthonormalize();
        camera
    }

    /// Camera at `position` aimed at `target`, focused on it.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3, fov: f32) -> Self {
        let mut camera = Self::new(position, target - position, up, fov);
        camera.focal_distance = (target - position).length().max(f32::EPSILON);
        camera
    }

    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up)
    }

    /// Re-derive `up` from `forward` so the basis is orthonormal again.
    pub fn orthonormalize(&mut self) {
        self.forward = self.forward.normalize_or(Vec3::NEG_Z);
        let right = self.forward.cross(self.up);
        let right = if right.length_squared() < 1e-12 {
            self.forward.any_orthonormal_vector()
        } else {
            right.normalize()
        };
        self.up = right.cross(self.forward).normalize();
    }

    /// Move in camera space: x along right, y along up, z along forward.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += self.right() * delta.x + self.up * delta.y + self.forward * delta.z;
    }

    /// Rotate the basis by yaw (around up), pitch (around right) and roll
    /// (around forward), all in radians.
    pub fn rotate(&mut self, yaw: f32, pitch: f32, roll: f32) {
        let rotation = Quat::from_axis_angle(self.up, yaw)
            * Quat::from_axis_angle(self.right(), pitch)
            * Quat::from_axis_angle(self.forward, roll);
        self.forward = rotation * self.forward;
        self.up = rotation * self.up;
        self.orthonormalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(c: &Camera) {
        assert!((c.forward.length() - 1.0).abs() < 1e-5);
        assert!((c.up.length() - 1.0).abs() < 1e-5);
        assert!(c.forward.dot(c.up).abs() < 1e-5);
        assert!((c.right().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn skewed_up_is_fixed() {
        let c = Camera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 1.0, 1.0), 1.0);
        assert_orthonormal(&c);
        assert!(c.up.y > 0.99);
    }

    #[test]
    fn rotations_keep_basis() {
        let mut c = Camera::look_at(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y, 1.0);
        for i in 0..50 {
            c.rotate(0.1 * i as f32, -0.05, 0.02);
            assert_orthonormal(&c);
        }
    }

    #[test]
    fn translate_is_camera_relative() {
        let mut c = Camera::default();
        c.translate(Vec3::new(1.0, 0.0, 2.0));
        assert!(c.position.abs_diff_eq(Vec3::new(1.0, 0.0, -2.0), 1e-6));
    }

    #[test]
    fn look_at_focuses_on_target() {
        let c = Camera::look_at(Vec3::new(3.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y, 1.0);
        assert!((c.focal_distance - 5.0).abs() < 1e-5);
        assert!(c.forward.abs_diff_eq(Vec3::new(-0.6, 0.0, -0.8), 1e-5));
    }
}
