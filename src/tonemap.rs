//! HDR to display mapping applied to the averaged accumulation image.
//!
//! Each operator first compresses the range and then applies gamma. All of
//! them are pure scalar functions, so the same accumulation and settings
//! always give bit-identical output.

use glam::{Vec3, Vec4};

/// Tone curve selection. The discriminant is what the device sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ToneMapMode {
    /// `c / (c + 1)`
    #[default]
    Reinhard = 0,
    /// Narkowicz 2015 single-curve fit
    Aces = 1,
    /// Hill's fit of the RRT + ODT with sRGB input/output matrices
    AcesFitted = 2,
}

impl ToneMapMode {
    pub fn from_index(index: u32) -> Self {
        match index {
            1 => ToneMapMode::Aces,
            2 => ToneMapMode::AcesFitted,
            _ => ToneMapMode::Reinhard,
        }
    }
}

pub fn reinhard(color: Vec3) -> Vec3 {
    color / (color + Vec3::ONE)
}

pub fn aces(color: Vec3) -> Vec3 {
    const A: f32 = 2.51;
    const B: f32 = 0.03;
    const C: f32 = 2.43;
    const D: f32 = 0.59;
    const E: f32 = 0.14;
    let x = color;
    ((x * (A * x + B)) / (x * (C * x + D) + E)).clamp(Vec3::ZERO, Vec3::ONE)
}

/// sRGB => XYZ => D65_2_D60 => AP1 => RRT_SAT
const ACES_INPUT: [[f32; 3]; 3] = [
    [0.59719, 0.35458, 0.04823],
    [0.07600, 0.90834, 0.01566],
    [0.02840, 0.13383, 0.83777],
];

/// ODT_SAT => XYZ => D60_2_D65 => sRGB
const ACES_OUTPUT: [[f32; 3]; 3] = [
    [1.60475, -0.53108, -0.07367],
    [-0.10208, 1.10813, -0.00605],
    [-0.00327, -0.07276, 1.07602],
];

fn mul_rows(rows: &[[f32; 3]; 3], v: Vec3) -> Vec3 {
    Vec3::new(
        Vec3::from_array(rows[0]).dot(v),
        Vec3::from_array(rows[1]).dot(v),
        Vec3::from_array(rows[2]).dot(v),
    )
}

fn rrt_and_odt_fit(v: Vec3) -> Vec3 {
    let a = v * (v + 0.0245786) - 0.000090537;
    let b = v * (0.983729 * v + 0.4329510) + 0.238081;
    a / b
}

pub fn aces_fitted(color: Vec3) -> Vec3 {
    let color = mul_rows(&ACES_INPUT, color);
    let color = rrt_and_odt_fit(color);
    mul_rows(&ACES_OUTPUT, color).clamp(Vec3::ZERO, Vec3::ONE)
}

pub fn gamma_correct(color: Vec3, gamma: f32) -> Vec3 {
    color.max(Vec3::ZERO).powf(1.0 / gamma)
}

/// Map an averaged HDR pixel (alpha untouched) to display range.
pub fn tone_map(pixel: Vec4, mode: ToneMapMode, gamma: f32) -> Vec4 {
    let rgb = pixel.truncate();
    let mapped = match mode {
        ToneMapMode::Reinhard => reinhard(rgb),
        ToneMapMode::Aces => aces(rgb),
        ToneMapMode::AcesFitted => aces_fitted(rgb),
    };
    gamma_correct(mapped, gamma).extend(pixel.w)
}
