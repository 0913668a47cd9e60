//! Material response at a surface hit.
//!
//! Exactly one outcome is chosen per hit, in priority order: fresnel
//! reflection, volume scattering, refraction, then the glossy/diffuse blend.

use glam::{Vec3, Vec3A};
use rand::Rng;

use super::intersect::SurfaceHit;
use super::texture::TextureView;
use crate::gpu::layout::GpuMaterial;
use crate::random::{random_cosine_direction, random_unit_vector, slerp};
use crate::ray::Ray;

/// Probability that a non-metal draw still keeps the material roughness.
const KEEP_ROUGHNESS_CHANCE: f32 = 0.2;

/// Running state of one light path.
#[derive(Debug, Clone, Copy)]
pub struct PathState {
    pub ray: Ray,
    /// Product of all response colours so far
    pub throughput: Vec3A,
    /// Light collected so far
    pub radiance: Vec3A,
}

impl PathState {
    pub fn new(ray: Ray) -> Self {
        Self {
            ray,
            throughput: Vec3A::ONE,
            radiance: Vec3A::ZERO,
        }
    }

    /// Collect emission, attenuate, and continue from `origin` along `direction`.
    fn bounce(&mut self, origin: Vec3A, direction: Vec3A, emission: Vec3A, response: Vec3A) {
        self.ray.origin = origin;
        self.ray.set_direction(direction);
        self.radiance += emission * self.throughput;
        self.throughput *= response;
    }
}

/// What a hit did to the path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    /// The path bounced; `normal` is the shading normal facing the ray.
    Scattered { response: Vec3A, normal: Vec3A },
    /// The hit is ignored (cutout, or a volume exit) and the ray carries on
    /// from the hit point without spending a bounce.
    PassThrough,
}

/// Material parameters after texture lookups.
struct Surface {
    albedo: Vec3A,
    metalness: f32,
    roughness: f32,
    emission: Vec3A,
    normal: Vec3A,
}

fn vec3a(v: [f32; 3]) -> Vec3A {
    Vec3A::from_array(v)
}

#[inline]
fn reflect(direction: Vec3A, normal: Vec3A) -> Vec3A {
    direction - 2.0 * direction.dot(normal) * normal
}

/// Snell refraction; `None` on total internal reflection.
#[inline]
fn refract(direction: Vec3A, normal: Vec3A, eta: f32) -> Option<Vec3A> {
    let cos_i = normal.dot(direction);
    let k = 1.0 - eta * eta * (1.0 - cos_i * cos_i);
    (k >= 0.0).then(|| eta * direction - (eta * cos_i + k.sqrt()) * normal)
}

/// Texture lookups and alpha test. `None` means the alpha test discarded the
/// hit.
fn evaluate_surface<R: Rng>(
    hit: &SurfaceHit,
    material: &GpuMaterial,
    textures: &TextureView,
    rng: &mut R,
) -> Option<Surface> {
    let mut surface = Surface {
        albedo: vec3a(material.albedo),
        metalness: material.metalness,
        roughness: material.roughness,
        emission: vec3a(material.emission) * material.emission_strength,
        normal: hit.normal,
    };

    if material.albedo_texture >= 0.0 {
        let texel = textures.sample(hit.uv, material.albedo_texture as i32);
        surface.albedo *= Vec3A::from(texel.truncate());
        if texel.w < rng.random::<f32>() {
            return None;
        }
    }
    if material.metalness_texture >= 0.0 {
        surface.metalness *= textures.sample(hit.uv, material.metalness_texture as i32).z;
    }
    if material.roughness_texture >= 0.0 {
        surface.roughness *= textures.sample(hit.uv, material.roughness_texture as i32).y;
    }
    if material.emission_texture >= 0.0 {
        let texel = textures.sample(hit.uv, material.emission_texture as i32);
        surface.emission *= Vec3A::from(texel.truncate());
    }
    if material.normal_texture >= 0.0 {
        let texel = textures.sample(hit.uv, material.normal_texture as i32).truncate();
        let tangent_normal =
            (Vec3::new(texel.x, 1.0 - texel.y, texel.z) * 2.0 - Vec3::ONE).normalize_or(Vec3::Z);
        surface.normal = (hit.tangent * tangent_normal.x
            + hit.bitangent * tangent_normal.y
            + hit.normal * tangent_normal.z)
            .normalize_or(hit.normal);
    }

    if !hit.front_face {
        surface.normal = -surface.normal;
    }
    Some(surface)
}

/// Apply the material at `hit` to the path.
pub fn react<R: Rng>(
    state: &mut PathState,
    hit: &SurfaceHit,
    material: &GpuMaterial,
    textures: &TextureView,
    rng: &mut R,
) -> Interaction {
    let Some(mut surface) = evaluate_surface(hit, material, textures, rng) else {
        return Interaction::PassThrough;
    };
    let direction = state.ray.direction;
    let normal = surface.normal;
    let specular = reflect(direction, normal);
    let diffuse = random_cosine_direction(rng, normal);

    // Metal draws are tinted and keep their roughness. Other draws fall back
    // to fully diffuse unless the roughness bias keeps them glossy.
    let metal = rng.random::<f32>() < surface.metalness;
    if !metal && rng.random::<f32>() >= KEEP_ROUGHNESS_CHANCE {
        surface.roughness = 1.0;
    }

    if material.fresnel_strength > 0.0 {
        let facing = normal.dot(-direction).max(0.0);
        if 1.0 - facing.powf(material.fresnel_strength) >= rng.random::<f32>() {
            let response = vec3a(material.fresnel_color);
            state.bounce(hit.position, specular, surface.emission, response);
            return Interaction::Scattered { response, normal };
        }
    }

    if material.density > 0.0 {
        let depth = -rng.random::<f32>().ln() / material.density;
        if hit.front_face || depth >= hit.distance {
            return Interaction::PassThrough;
        }
        let origin = state.ray.at(depth);
        let scattered = random_unit_vector(rng);
        state.bounce(origin, scattered, surface.emission, surface.albedo);
        return Interaction::Scattered {
            response: surface.albedo,
            normal,
        };
    }

    if material.ior > 0.0 {
        let eta = if hit.front_face { 1.0 / material.ior } else { material.ior };
        let refracted = refract(direction, normal, eta).unwrap_or(specular);
        state.bounce(hit.position, refracted, surface.emission, surface.albedo);
        return Interaction::Scattered {
            response: surface.albedo,
            normal,
        };
    }

    let response = if metal {
        surface.albedo * vec3a(material.metalness_color)
    } else {
        surface.albedo
    };
    let scattered = slerp(specular, diffuse, surface.roughness);
    state.bounce(hit.position, scattered, surface.emission, response);
    Interaction::Scattered { response, normal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::PixelRng;
    use crate::scene::Material;
    use glam::Vec2;

    fn floor_hit() -> SurfaceHit {
        SurfaceHit {
            distance: 1.0,
            position: Vec3A::ZERO,
            normal: Vec3A::Y,
            tangent: Vec3A::X,
            bitangent: Vec3A::Z,
            uv: Vec2::ZERO,
            front_face: true,
            material_id: 0,
        }
    }

    fn incoming() -> PathState {
        PathState::new(Ray::new(Vec3A::new(-1.0, 1.0, 0.0), Vec3A::new(1.0, -1.0, 0.0)))
    }

    #[test]
    fn emission_is_collected_before_attenuation() {
        let material = GpuMaterial::from(&Material::light_source(Vec3::new(2.0, 1.0, 0.5), 2.0));
        let mut state = incoming();
        let mut rng = PixelRng::from_state(1);
        let result = react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
        assert!(matches!(result, Interaction::Scattered { .. }));
        assert!(state.radiance.abs_diff_eq(Vec3A::new(4.0, 2.0, 1.0), 1e-6));
        assert_eq!(state.throughput, Vec3A::ZERO);
    }

    #[test]
    fn mirror_reflects() {
        let material = GpuMaterial::from(&Material::mirror());
        for seed in 0..32 {
            let mut state = incoming();
            let mut rng = PixelRng::from_state(seed);
            react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
            assert!(state.ray.direction.abs_diff_eq(Vec3A::new(1.0, 1.0, 0.0).normalize(), 1e-4));
        }
    }

    #[test]
    fn diffuse_leaves_above_surface() {
        let material = GpuMaterial::from(&Material::matte(Vec3::splat(0.5), 0.0));
        let mut rng = PixelRng::from_state(9);
        for _ in 0..256 {
            let mut state = incoming();
            react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
            assert!(state.ray.direction.y >= -1e-5);
            assert!(state.throughput.abs_diff_eq(Vec3A::splat(0.5), 1e-6));
        }
    }

    #[test]
    fn volume_entry_passes_through() {
        let material = GpuMaterial::from(&Material::constant_density(Vec3::ONE, 5.0));
        let mut state = incoming();
        let mut rng = PixelRng::from_state(3);
        assert_eq!(
            react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng),
            Interaction::PassThrough
        );
    }

    #[test]
    fn refraction_bends_towards_normal() {
        let material = GpuMaterial::from(&Material::transparent(Vec3::ONE, 1.5, Vec3::ONE, 0.0));
        let mut state = incoming();
        let mut rng = PixelRng::from_state(5);
        react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
        let d = state.ray.direction;
        assert!(d.y < 0.0);
        // sin(theta_t) = sin(45 deg) / 1.5
        assert!((d.x - std::f32::consts::FRAC_1_SQRT_2 / 1.5).abs() < 1e-4);
    }

    #[test]
    fn total_internal_reflection_falls_back_to_mirror() {
        let material = GpuMaterial::from(&Material::transparent(Vec3::ONE, 1.5, Vec3::ONE, 0.0));
        let mut hit = floor_hit();
        hit.front_face = false;
        hit.normal = Vec3A::NEG_Y;
        let mut state = incoming();
        let mut rng = PixelRng::from_state(5);
        react(&mut state, &hit, &material, &TextureView::EMPTY, &mut rng);
        assert!(state.ray.direction.abs_diff_eq(Vec3A::new(1.0, 1.0, 0.0).normalize(), 1e-4));
    }

    #[test]
    fn non_metal_is_never_tinted() {
        let material = GpuMaterial::from(&Material {
            albedo: Vec3::splat(0.5),
            roughness: 0.3,
            metalness_color: Vec3::X,
            ..Default::default()
        });
        let mut rng = PixelRng::from_state(17);
        for _ in 0..512 {
            let mut state = incoming();
            react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
            assert!(state.throughput.abs_diff_eq(Vec3A::splat(0.5), 1e-6));
        }
    }

    #[test]
    fn metal_is_always_tinted() {
        let material = GpuMaterial::from(&Material {
            albedo: Vec3::splat(0.5),
            metalness: 1.0,
            metalness_color: Vec3::X,
            ..Default::default()
        });
        let mut rng = PixelRng::from_state(23);
        for _ in 0..64 {
            let mut state = incoming();
            react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
            assert!(state.throughput.abs_diff_eq(Vec3A::new(0.5, 0.0, 0.0), 1e-6));
        }
    }

    #[test]
    fn transparent_texel_passes_through() {
        let material = GpuMaterial::from(&Material {
            albedo_texture: 0,
            ..Material::matte(Vec3::ONE, 0.0)
        });
        let cutout = [[1.0, 1.0, 1.0, 0.0]];
        let opaque = [[1.0, 1.0, 1.0, 1.0]];
        let mut rng = PixelRng::from_state(29);
        for _ in 0..64 {
            let mut state = incoming();
            let textures = TextureView::new(&cutout, 1, 1, 1);
            let result = react(&mut state, &floor_hit(), &material, &textures, &mut rng);
            assert_eq!(result, Interaction::PassThrough);
            assert_eq!(state.throughput, Vec3A::ONE);

            let textures = TextureView::new(&opaque, 1, 1, 1);
            let result = react(&mut state, &floor_hit(), &material, &textures, &mut rng);
            assert!(matches!(result, Interaction::Scattered { .. }));
        }
    }

    #[test]
    fn flat_normal_texel_keeps_geometric_normal() {
        let material = GpuMaterial::from(&Material {
            normal_texture: 0,
            ..Material::mirror()
        });
        let flat = [[0.5, 0.5, 1.0, 1.0]];
        let textures = TextureView::new(&flat, 1, 1, 1);
        let mut state = incoming();
        let mut rng = PixelRng::from_state(31);
        let result = react(&mut state, &floor_hit(), &material, &textures, &mut rng);
        let Interaction::Scattered { normal, .. } = result else {
            panic!("mirror did not scatter");
        };
        assert!(normal.abs_diff_eq(Vec3A::Y, 1e-5));
        assert!(state.ray.direction.abs_diff_eq(Vec3A::new(1.0, 1.0, 0.0).normalize(), 1e-4));
    }

    #[test]
    fn normal_texel_green_is_flipped() {
        let material = GpuMaterial::from(&Material {
            normal_texture: 0,
            ..Material::mirror()
        });
        // Green 0 is +1 along the bitangent once flipped.
        let tilted = [[0.5, 0.0, 1.0, 1.0]];
        let textures = TextureView::new(&tilted, 1, 1, 1);
        let mut state = incoming();
        let mut rng = PixelRng::from_state(37);
        let result = react(&mut state, &floor_hit(), &material, &textures, &mut rng);
        let Interaction::Scattered { normal, .. } = result else {
            panic!("mirror did not scatter");
        };
        assert!(normal.abs_diff_eq(Vec3A::new(0.0, 1.0, 1.0).normalize(), 1e-5));
        // (1, -1, 0) reflected about (0, 1, 1) / sqrt 2
        let expected = Vec3A::new(1.0, 0.0, 1.0).normalize();
        assert!(state.ray.direction.abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn fresnel_outranks_volume_and_refraction() {
        let fresnel_color = Vec3::new(0.2, 0.4, 0.6);
        let material = GpuMaterial::from(&Material {
            density: 5.0,
            ..Material::transparent(Vec3::ONE, 1.5, fresnel_color, 1000.0)
        });
        let mut rng = PixelRng::from_state(41);
        for _ in 0..64 {
            let mut state = incoming();
            let result = react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
            assert!(matches!(result, Interaction::Scattered { .. }));
            assert!(state.throughput.abs_diff_eq(Vec3A::from(fresnel_color), 1e-6));
            let specular = Vec3A::new(1.0, 1.0, 0.0).normalize();
            assert!(state.ray.direction.abs_diff_eq(specular, 1e-4));
        }
    }

    #[test]
    fn head_on_fresnel_falls_through_to_volume() {
        let material = GpuMaterial::from(&Material {
            density: 5.0,
            ..Material::transparent(Vec3::ONE, 1.5, Vec3::X, 1.0)
        });
        let mut rng = PixelRng::from_state(43);
        for _ in 0..64 {
            let mut state = PathState::new(Ray::new(Vec3A::Y, Vec3A::NEG_Y));
            let result = react(&mut state, &floor_hit(), &material, &TextureView::EMPTY, &mut rng);
            assert_eq!(result, Interaction::PassThrough);
        }
    }
}
