//! Environment lighting for rays that leave the scene.

use std::f32::consts::{PI, TAU};
use std::path::Path;

use glam::{Mat3, Vec2, Vec3};
use image::Rgb32FImage;
use log::info;

use crate::error::RenderResult;

/// Equirectangular HDR environment.
///
/// Without an image the environment is the constant `color`. Both are
/// scaled by `intensity`.
#[derive(Debug, Clone)]
pub struct Environment {
    pub image: Option<Rgb32FImage>,
    pub color: Vec3,
    /// Applied to the escaping direction before the lookup
    pub rotation: Mat3,
    pub intensity: f32,
    /// Escaping primary rays produce alpha 0
    pub transparent: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self::uniform(Vec3::ZERO)
    }
}

impl Environment {
    pub fn uniform(color: Vec3) -> Self {
        Self {
            image: None,
            color,
            rotation: Mat3::IDENTITY,
            intensity: 1.0,
            transparent: false,
        }
    }

    pub fn from_image(image: Rgb32FImage) -> Self {
        Self {
            image: Some(image),
            ..Self::uniform(Vec3::ONE)
        }
    }

    /// Load an equirectangular map (HDR, EXR or any LDR format `image` reads).
    pub fn load<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let image = image::open(path)?.to_rgb32f();
        info!(
            "Loaded environment {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self::from_image(image))
    }

    /// Rotate the environment around the world up axis.
    pub fn with_rotation_y(mut self, angle: f32) -> Self {
        self.rotation = Mat3::from_rotation_y(angle);
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.as_ref().map_or((0, 0), |img| img.dimensions())
    }
}

/// Equirectangular texture coordinate of a unit direction.
pub fn direction_to_uv(direction: Vec3) -> Vec2 {
    let u = direction.z.atan2(direction.x) / TAU + 0.5;
    let v = direction.y.clamp(-1.0, 1.0).acos() / PI;
    Vec2::new(u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poles_map_to_edges() {
        assert!(direction_to_uv(Vec3::Y).y.abs() < 1e-6);
        assert!((direction_to_uv(Vec3::NEG_Y).y - 1.0).abs() < 1e-6);
        let horizon = direction_to_uv(Vec3::X);
        assert!((horizon.x - 0.5).abs() < 1e-6);
        assert!((horizon.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Environment::load("/nonexistent/sky.hdr").is_err());
    }
}
