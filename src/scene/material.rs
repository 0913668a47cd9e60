//! Surface and volume material description.

use glam::Vec3;

/// Texture slot value meaning "no texture".
pub const NO_TEXTURE: i32 = -1;

/// Material parameters shared by every response mode of the kernel.
///
/// Compared with `==` when added to a scene so identical materials are
/// stored once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub albedo: Vec3,
    /// 0 = mirror, 1 = fully diffuse
    pub roughness: f32,
    /// Probability of the metallic (specular) response
    pub metalness: f32,
    /// Tint applied when the metallic response is chosen
    pub metalness_color: Vec3,
    pub emission: Vec3,
    pub emission_strength: f32,
    pub fresnel_color: Vec3,
    /// Exponent of the grazing-angle reflection probability; 0 disables it
    pub fresnel_strength: f32,
    /// Index of refraction; 0 disables refraction
    pub ior: f32,
    /// Volumetric density; 0 means an ordinary surface
    pub density: f32,
    pub albedo_texture: i32,
    pub metalness_texture: i32,
    pub roughness_texture: i32,
    pub emission_texture: i32,
    pub normal_texture: i32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: Vec3::ONE,
            roughness: 0.0,
            metalness: 0.0,
            metalness_color: Vec3::ONE,
            emission: Vec3::ONE,
            emission_strength: 0.0,
            fresnel_color: Vec3::ONE,
            fresnel_strength: 0.0,
            ior: 0.0,
            density: 0.0,
            albedo_texture: NO_TEXTURE,
            metalness_texture: NO_TEXTURE,
            roughness_texture: NO_TEXTURE,
            emission_texture: NO_TEXTURE,
            normal_texture: NO_TEXTURE,
        }
    }
}

impl Material {
    /// Black emitter.
    pub fn light_source(emission: Vec3, strength: f32) -> Self {
        Self {
            albedo: Vec3::ZERO,
            emission,
            emission_strength: strength,
            ..Default::default()
        }
    }

    /// Refractive dielectric.
    pub fn transparent(
        albedo: Vec3,
        ior: f32,
        fresnel_color: Vec3,
        fresnel_strength: f32,
    ) -> Self {
        Self {
            albedo,
            ior,
            fresnel_color,
            fresnel_strength,
            ..Default::default()
        }
    }

    /// Homogeneous participating medium bounded by the mesh surface.
    pub fn constant_density(albedo: Vec3, density: f32) -> Self {
        Self {
            albedo,
            roughness: 1.0,
            ior: 1.0,
            density,
            ..Default::default()
        }
    }

    pub fn matte(albedo: Vec3, metalness: f32) -> Self {
        Self {
            albedo,
            roughness: 1.0,
            metalness,
            ..Default::default()
        }
    }

    pub fn mirror() -> Self {
        Self {
            roughness: 0.0,
            metalness: 1.0,
            ..Default::default()
        }
    }

    /// Texture ids in slot order: albedo, metalness, roughness, emission, normal.
    pub fn texture_ids(&self) -> [i32; 5] {
        [
            self.albedo_texture,
            self.metalness_texture,
            self.roughness_texture,
            self.emission_texture,
            self.normal_texture,
        ]
    }
}
