//! Material textures and their packing into one texture array.

use image::imageops::{self, FilterType};
use image::Rgba32FImage;
use log::debug;

/// Largest layer edge in the packed array.
pub const MAX_TEXTURE_SIZE: u32 = 2048;

/// All scene textures resized to one common size, layer after layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureArray {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    /// RGBA texels, row-major per layer
    pub texels: Vec<[f32; 4]>,
}

impl TextureArray {
    /// Resize every texture to the largest width/height among them (capped at
    /// [`MAX_TEXTURE_SIZE`]) and stack them.
    pub fn pack(textures: &[Rgba32FImage]) -> Self {
        if textures.is_empty() {
            return Self::default();
        }
        let width = textures.iter().map(|t| t.width()).max().unwrap_or(1);
        let height = textures.iter().map(|t| t.height()).max().unwrap_or(1);
        let width = width.clamp(1, MAX_TEXTURE_SIZE);
        let height = height.clamp(1, MAX_TEXTURE_SIZE);

        let mut texels = Vec::with_capacity((width * height) as usize * textures.len());
        for texture in textures {
            if texture.dimensions() == (width, height) {
                texels.extend(texture.pixels().map(|p| p.0));
            } else {
                debug!(
                    "Resizing texture {}x{} to {}x{}",
                    texture.width(),
                    texture.height(),
                    width,
                    height
                );
                let resized = imageops::resize(texture, width, height, FilterType::Triangle);
                texels.extend(resized.pixels().map(|p| p.0));
            }
        }
        Self {
            width,
            height,
            layers: textures.len() as u32,
            texels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn layers_share_largest_size() {
        let small = Rgba32FImage::from_pixel(2, 2, Rgba([1.0, 0.0, 0.0, 1.0]));
        let large = Rgba32FImage::from_pixel(8, 4, Rgba([0.0, 1.0, 0.0, 1.0]));
        let packed = TextureArray::pack(&[small, large]);
        assert_eq!((packed.width, packed.height, packed.layers), (8, 4, 2));
        assert_eq!(packed.texels.len(), 64);
        let first = packed.texels[0];
        assert!((first[0] - 1.0).abs() < 1e-4 && first[1].abs() < 1e-4);
        assert_eq!(packed.texels[32], [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_pack() {
        assert_eq!(TextureArray::pack(&[]).layers, 0);
    }
}
