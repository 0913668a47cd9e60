//! Denoising of the accumulated image.
//!
//! A [`Denoiser`] receives the averaged HDR colour together with the
//! first-hit albedo and normal images and returns a new colour image of the
//! same size. [`JointBilateral`] is the built-in implementation; external
//! libraries can be plugged in through the trait.

use glam::{Vec3, Vec4};
use log::debug;
use rayon::prelude::*;

use crate::error::DenoiseError;

/// Guide images handed to a denoiser, all `width * height` pixels.
#[derive(Debug, Clone, Copy)]
pub struct DenoiseInput<'a> {
    pub width: u32,
    pub height: u32,
    /// Averaged HDR RGBA
    pub color: &'a [f32],
    /// RGB
    pub albedo: &'a [f32],
    /// RGB in [0, 1]
    pub normal: &'a [f32],
}

impl DenoiseInput<'_> {
    /// Check every buffer against the image size.
    pub fn validate(&self) -> Result<(), DenoiseError> {
        let pixels = self.width as usize * self.height as usize;
        for (buffer, channels) in [(self.color, 4), (self.albedo, 3), (self.normal, 3)] {
            if buffer.len() != pixels * channels {
                return Err(DenoiseError::SizeMismatch {
                    width: self.width,
                    height: self.height,
                    actual: buffer.len(),
                });
            }
        }
        Ok(())
    }
}

pub trait Denoiser: Send {
    fn name(&self) -> &str;

    /// Returns denoised RGBA with the layout of `input.color`.
    fn denoise(&mut self, input: &DenoiseInput) -> Result<Vec<f32>, DenoiseError>;
}

/// Edge-preserving filter whose weights combine pixel distance, colour
/// difference and the difference of the albedo and normal guides.
#[derive(Debug, Clone, PartialEq)]
pub struct JointBilateral {
    pub radius: u32,
    pub sigma_spatial: f32,
    pub sigma_color: f32,
    pub sigma_albedo: f32,
    pub sigma_normal: f32,
}

impl Default for JointBilateral {
    fn default() -> Self {
        Self {
            radius: 3,
            sigma_spatial: 2.0,
            sigma_color: 0.5,
            sigma_albedo: 0.1,
            sigma_normal: 0.1,
        }
    }
}

impl Denoiser for JointBilateral {
    fn name(&self) -> &str {
        "joint bilateral"
    }

    fn denoise(&mut self, input: &DenoiseInput) -> Result<Vec<f32>, DenoiseError> {
        input.validate()?;
        let width = input.width as usize;
        let height = input.height as usize;
        let mut output = vec![0.0; input.color.len()];
        if width == 0 || height == 0 {
            return Ok(output);
        }

        let radius = self.radius as i64;
        let spatial = -0.5 / (self.sigma_spatial * self.sigma_spatial).max(f32::EPSILON);
        let color_coef = -0.5 / (self.sigma_color * self.sigma_color).max(f32::EPSILON);
        let albedo_coef = -0.5 / (self.sigma_albedo * self.sigma_albedo).max(f32::EPSILON);
        let normal_coef = -0.5 / (self.sigma_normal * self.sigma_normal).max(f32::EPSILON);

        let color = |i: usize| Vec4::from_slice(&input.color[i * 4..i * 4 + 4]);
        let albedo = |i: usize| Vec3::from_slice(&input.albedo[i * 3..i * 3 + 3]);
        let normal = |i: usize| Vec3::from_slice(&input.normal[i * 3..i * 3 + 3]);

        output
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..width {
                    let center = y * width + x;
                    let (c0, a0, n0) = (color(center), albedo(center), normal(center));
                    let mut sum = Vec4::ZERO;
                    let mut total = 0.0;
                    for dy in -radius..=radius {
                        let sy = y as i64 + dy;
                        if sy < 0 || sy >= height as i64 {
                            continue;
                        }
                        for dx in -radius..=radius {
                            let sx = x as i64 + dx;
                            if sx < 0 || sx >= width as i64 {
                                continue;
                            }
                            let i = sy as usize * width + sx as usize;
                            let c = color(i);
                            let exponent = (dx * dx + dy * dy) as f32 * spatial
                                + (c - c0).truncate().length_squared() * color_coef
                                + (albedo(i) - a0).length_squared() * albedo_coef
                                + (normal(i) - n0).length_squared() * normal_coef;
                            let weight = exponent.exp();
                            sum += c * weight;
                            total += weight;
                        }
                    }
                    // The centre pixel always contributes weight 1.
                    let filtered = sum / total;
                    let filtered = filtered.truncate().extend(c0.w);
                    row[x * 4..x * 4 + 4].copy_from_slice(&filtered.to_array());
                }
            });
        debug!("Denoised {}x{} image", width, height);
        Ok(output)
    }
}
