//! Random number generation for the path-tracing kernel.
//!
//! Every pixel sample owns a small PCG generator seeded from its pixel
//! coordinate and the frame index, so a dispatch is reproducible no matter
//! how the pixels are scheduled across threads. The generator implements
//! [`rand::RngCore`], so the usual `rng.random::<f32>()` API works on it.
//! The same hash is used by `shaders/trace.comp`.

use glam::{Vec2, Vec3A};
use rand::{Rng, RngCore};
use std::f32::consts::TAU;

/// One round of the PCG-RXS-M-XS hash.
#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Per-pixel PCG generator.
#[derive(Debug, Clone)]
pub struct PixelRng {
    state: u32,
}

impl PixelRng {
    /// Seed from a pixel coordinate and the running frame index.
    pub fn for_pixel(x: u32, y: u32, frame_index: u32) -> Self {
        Self {
            state: pcg_hash(x ^ pcg_hash(y ^ pcg_hash(frame_index))),
        }
    }

    /// Seed directly.
    pub fn from_state(state: u32) -> Self {
        Self { state }
    }
}

impl RngCore for PixelRng {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
        let word = ((self.state >> ((self.state >> 28) + 4)) ^ self.state)
            .wrapping_mul(277_803_737);
        (word >> 22) ^ word
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.next_u32() as u64;
        let hi = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Generate random unit vector uniformly distributed on unit sphere.
pub fn random_unit_vector<R: Rng>(rng: &mut R) -> Vec3A {
    // Uniform θ in [0, 2π) and cos(φ) in [-1, 1]
    let theta = TAU * rng.random::<f32>();
    let cos_phi = 2.0 * rng.random::<f32>() - 1.0;
    let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
    Vec3A::new(sin_phi * theta.cos(), sin_phi * theta.sin(), cos_phi)
}

/// Cosine-weighted direction around `normal`.
pub fn random_cosine_direction<R: Rng>(rng: &mut R, normal: Vec3A) -> Vec3A {
    let direction = normal + random_unit_vector(rng);
    // Catch degenerate scatter direction (very close to zero)
    if direction.length_squared() < 1e-8 {
        normal
    } else {
        direction.normalize()
    }
}

/// Uniform point inside the unit disk, polar method (fixed draw count).
pub fn random_in_unit_disk<R: Rng>(rng: &mut R) -> Vec2 {
    let angle = TAU * rng.random::<f32>();
    let radius = rng.random::<f32>().sqrt();
    Vec2::new(angle.cos(), angle.sin()) * radius
}

/// Spherical linear interpolation between two unit vectors.
///
/// Falls back to `b` when the vectors are parallel or the angle is undefined.
pub fn slerp(a: Vec3A, b: Vec3A, t: f32) -> Vec3A {
    let angle = a.dot(b).clamp(-1.0, 1.0).acos();
    let sin_angle = angle.sin();
    if angle.is_nan() || sin_angle.abs() < 1e-6 {
        return b;
    }
    ((1.0 - t) * angle).sin() / sin_angle * a + (t * angle).sin() / sin_angle * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pixel_same_stream() {
        let mut a = PixelRng::for_pixel(3, 7, 11);
        let mut b = PixelRng::for_pixel(3, 7, 11);
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        let mut c = PixelRng::for_pixel(3, 7, 12);
        let mut a = PixelRng::for_pixel(3, 7, 11);
        assert_ne!(a.next_u64(), c.next_u64());
    }

    #[test]
    fn floats_stay_in_unit_range() {
        let mut rng = PixelRng::from_state(42);
        for _ in 0..10_000 {
            let value: f32 = rng.random();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn cosine_direction_in_hemisphere() {
        let mut rng = PixelRng::from_state(9);
        let normal = Vec3A::new(0.0, 0.0, 1.0);
        for _ in 0..1000 {
            let d = random_cosine_direction(&mut rng, normal);
            assert!(d.dot(normal) >= -1e-5);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn slerp_endpoints() {
        let a = Vec3A::X;
        let b = Vec3A::Y;
        assert!((slerp(a, b, 0.0) - a).length() < 1e-5);
        assert!((slerp(a, b, 1.0) - b).length() < 1e-5);
        let mid = slerp(a, b, 0.5);
        assert!((mid.length() - 1.0).abs() < 1e-5);
        assert!((mid.x - mid.y).abs() < 1e-5);
        assert_eq!(slerp(a, a, 0.3), a);
    }

    #[test]
    fn disk_samples_inside() {
        let mut rng = PixelRng::from_state(1);
        for _ in 0..1000 {
            assert!(random_in_unit_disk(&mut rng).length() <= 1.0 + 1e-6);
        }
    }
}
