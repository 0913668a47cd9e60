//! Bilinear texture fetches from flat texel buffers.

use glam::{Vec2, Vec3A, Vec4};

use crate::scene::environment::direction_to_uv;

/// Read-only view of a layered RGBA texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureView<'a> {
    pub texels: &'a [[f32; 4]],
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

impl<'a> TextureView<'a> {
    pub const EMPTY: TextureView<'static> = TextureView {
        texels: &[],
        width: 0,
        height: 0,
        layers: 0,
    };

    pub fn new(texels: &'a [[f32; 4]], width: u32, height: u32, layers: u32) -> Self {
        // Never index past what was actually uploaded.
        let complete = (width as usize * height as usize).max(1);
        let layers = layers.min((texels.len() / complete) as u32);
        Self {
            texels,
            width,
            height,
            layers,
        }
    }

    fn texel(&self, x: i64, y: i64, layer: u32, wrap_v: bool) -> Vec4 {
        let w = self.width as i64;
        let h = self.height as i64;
        let x = x.rem_euclid(w);
        let y = if wrap_v { y.rem_euclid(h) } else { y.clamp(0, h - 1) };
        let index = layer as usize * (w * h) as usize + (y * w + x) as usize;
        Vec4::from_array(self.texels[index])
    }

    fn bilinear(&self, uv: Vec2, layer: u32, wrap_v: bool) -> Vec4 {
        let u = uv.x - uv.x.floor();
        let v = if wrap_v { uv.y - uv.y.floor() } else { uv.y.clamp(0.0, 1.0) };
        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        let top = self
            .texel(x0, y0, layer, wrap_v)
            .lerp(self.texel(x0 + 1, y0, layer, wrap_v), fx);
        let bottom = self
            .texel(x0, y0 + 1, layer, wrap_v)
            .lerp(self.texel(x0 + 1, y0 + 1, layer, wrap_v), fx);
        top.lerp(bottom, fy)
    }

    fn has_layer(&self, layer: i32) -> bool {
        layer >= 0 && (layer as u32) < self.layers && self.width > 0 && self.height > 0
    }

    /// Bilinear sample with repeat addressing. Out-of-range layers and empty
    /// textures read as white.
    pub fn sample(&self, uv: Vec2, layer: i32) -> Vec4 {
        if !self.has_layer(layer) {
            return Vec4::ONE;
        }
        self.bilinear(uv, layer as u32, true)
    }

    /// Equirectangular lookup of a unit direction (U wraps, V clamps).
    pub fn sample_direction(&self, direction: Vec3A) -> Vec4 {
        if !self.has_layer(0) {
            return Vec4::ONE;
        }
        self.bilinear(direction_to_uv(direction.into()), 0, false)
    }
}
