//! Built-in scenes assembled from a few procedural meshes.
//!
//! Every scene reuses one mesh per shape and places it through instances,
//! so a sphere field is one BLAS plus many transforms.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Mat4, Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Camera, Material, Scene, Triangle, Vertex};
use crate::error::SceneError;

/// UV sphere centred at the origin with outward winding.
pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> (Vec<Vertex>, Vec<Triangle>) {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for i in 0..=rings {
        let theta = PI * i as f32 / rings as f32;
        for j in 0..=segments {
            let phi = TAU * j as f32 / segments as f32;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            let uv = Vec2::new(j as f32 / segments as f32, i as f32 / rings as f32);
            vertices.push(Vertex::new(normal * radius, normal, uv));
        }
    }

    let mut triangles = Vec::with_capacity((segments * rings * 2) as usize);
    let stride = segments + 1;
    for i in 0..rings {
        for j in 0..segments {
            let a = i * stride + j;
            let b = a + stride;
            triangles.push(Triangle::new(a, a + 1, b));
            triangles.push(Triangle::new(a + 1, b + 1, b));
        }
    }
    (vertices, triangles)
}

/// Unit quad in the XZ plane facing +Y.
pub fn quad() -> (Vec<Vertex>, Vec<Triangle>) {
    let corner = |x: f32, z: f32| {
        Vertex::new(Vec3::new(x - 0.5, 0.0, z - 0.5), Vec3::Y, Vec2::new(x, z))
    };
    (
        vec![corner(0.0, 0.0), corner(0.0, 1.0), corner(1.0, 1.0), corner(1.0, 0.0)],
        vec![Triangle::new(0, 1, 2), Triangle::new(0, 2, 3)],
    )
}

/// Unit cube centred at the origin with flat per-face normals.
pub fn cuboid() -> (Vec<Vertex>, Vec<Triangle>) {
    let faces = [
        Mat4::from_translation(Vec3::Y * 0.5),
        Mat4::from_translation(Vec3::NEG_Y * 0.5) * Mat4::from_rotation_x(PI),
        Mat4::from_translation(Vec3::Z * 0.5) * Mat4::from_rotation_x(FRAC_PI_2),
        Mat4::from_translation(Vec3::NEG_Z * 0.5) * Mat4::from_rotation_x(-FRAC_PI_2),
        Mat4::from_translation(Vec3::X * 0.5) * Mat4::from_rotation_z(-FRAC_PI_2),
        Mat4::from_translation(Vec3::NEG_X * 0.5) * Mat4::from_rotation_z(FRAC_PI_2),
    ];
    let (quad_vertices, quad_triangles) = quad();
    let mut vertices = Vec::with_capacity(24);
    let mut triangles = Vec::with_capacity(12);
    for face in faces {
        let base = vertices.len() as u32;
        vertices.extend(quad_vertices.iter().map(|v| {
            Vertex::new(face.transform_point3(v.position), face.transform_vector3(v.normal), v.uv)
        }));
        triangles.extend(quad_triangles.iter().map(|t| {
            Triangle::new(t.indices[0] + base, t.indices[1] + base, t.indices[2] + base)
        }));
    }
    (vertices, triangles)
}

/// Closed white box with red and green side walls and a ceiling light.
/// The box spans [-1, 1] on every axis and is open towards +Z.
pub fn cornell_box() -> Result<Scene, SceneError> {
    let mut scene = Scene::new("cornell");
    let (vertices, triangles) = quad();
    let wall = scene.add_mesh("wall", &vertices, &triangles)?;
    let (vertices, triangles) = cuboid();
    let block = scene.add_mesh("block", &vertices, &triangles)?;

    let white = scene.add_material(Material::matte(Vec3::splat(0.73), 0.0));
    let red = scene.add_material(Material::matte(Vec3::new(0.65, 0.05, 0.05), 0.0));
    let green = scene.add_material(Material::matte(Vec3::new(0.12, 0.45, 0.15), 0.0));
    let light = scene.add_material(Material::light_source(Vec3::new(1.0, 0.85, 0.6), 15.0));

    let size = Mat4::from_scale(Vec3::new(2.0, 1.0, 2.0));
    let walls = [
        (white, Mat4::from_translation(Vec3::NEG_Y)),
        (white, Mat4::from_translation(Vec3::Y) * Mat4::from_rotation_x(PI)),
        (white, Mat4::from_translation(Vec3::NEG_Z) * Mat4::from_rotation_x(FRAC_PI_2)),
        (red, Mat4::from_translation(Vec3::NEG_X) * Mat4::from_rotation_z(-FRAC_PI_2)),
        (green, Mat4::from_translation(Vec3::X) * Mat4::from_rotation_z(FRAC_PI_2)),
    ];
    for (material, placement) in walls {
        scene.add_instance(wall, material, placement * size);
    }
    scene.add_instance(
        wall,
        light,
        Mat4::from_translation(Vec3::Y * 0.995)
            * Mat4::from_rotation_x(PI)
            * Mat4::from_scale(Vec3::new(0.5, 1.0, 0.5)),
    );

    scene.add_instance(
        block,
        white,
        Mat4::from_translation(Vec3::new(-0.35, -0.4, -0.3))
            * Mat4::from_rotation_y(0.3)
            * Mat4::from_scale(Vec3::new(0.6, 1.2, 0.6)),
    );
    scene.add_instance(
        block,
        white,
        Mat4::from_translation(Vec3::new(0.4, -0.7, 0.3))
            * Mat4::from_rotation_y(-0.3)
            * Mat4::from_scale(Vec3::splat(0.6)),
    );

    scene.cameras.push(Camera::look_at(
        Vec3::new(0.0, 0.0, 3.9),
        Vec3::ZERO,
        Vec3::Y,
        40f32.to_radians(),
    ));
    Ok(scene)
}

/// One emissive unit sphere at the origin in empty space.
pub fn emissive_sphere(emission: Vec3) -> Result<Scene, SceneError> {
    let mut scene = Scene::new("emissive");
    let (vertices, triangles) = uv_sphere(1.0, 48, 24);
    let sphere = scene.add_mesh("sphere", &vertices, &triangles)?;
    let material = scene.add_material(Material::light_source(emission, 1.0));
    scene.add_instance(sphere, material, Mat4::IDENTITY);
    scene.cameras.push(Camera::look_at(
        Vec3::new(0.0, 0.0, 4.0),
        Vec3::ZERO,
        Vec3::Y,
        50f32.to_radians(),
    ));
    Ok(scene)
}

/// Field of small random spheres around three large ones on a ground plane.
pub fn random_spheres(seed: u64) -> Result<Scene, SceneError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut scene = Scene::new("spheres");
    let (vertices, triangles) = uv_sphere(1.0, 32, 16);
    let sphere = scene.add_mesh("sphere", &vertices, &triangles)?;
    let (vertices, triangles) = quad();
    let ground = scene.add_mesh("ground", &vertices, &triangles)?;

    let ground_material = scene.add_material(Material::matte(Vec3::splat(0.5), 0.0));
    scene.add_instance(ground, ground_material, Mat4::from_scale(Vec3::new(100.0, 1.0, 100.0)));

    let glass = Material::transparent(Vec3::ONE, 1.5, Vec3::ONE, 5.0);
    for a in -11..11 {
        for b in -11..11 {
            let choose: f32 = rng.random();
            let center = Vec3::new(
                a as f32 + 0.9 * rng.random::<f32>(),
                0.2,
                b as f32 + 0.9 * rng.random::<f32>(),
            );
            if (center - Vec3::new(4.0, 0.2, 0.0)).length() <= 0.9 {
                continue;
            }
            let material = if choose < 0.8 {
                let albedo = Vec3::new(rng.random(), rng.random(), rng.random())
                    * Vec3::new(rng.random(), rng.random(), rng.random());
                Material::matte(albedo, 0.0)
            } else if choose < 0.95 {
                let albedo = Vec3::new(
                    rng.random_range(0.5..1.0),
                    rng.random_range(0.5..1.0),
                    rng.random_range(0.5..1.0),
                );
                Material {
                    albedo,
                    roughness: rng.random_range(0.0..0.5),
                    metalness: 1.0,
                    ..Default::default()
                }
            } else {
                glass
            };
            let material = scene.add_material(material);
            scene.add_instance(sphere, material, Mat4::from_scale_rotation_translation(
                Vec3::splat(0.2),
                glam::Quat::IDENTITY,
                center,
            ));
        }
    }

    let glass = scene.add_material(glass);
    let brown = scene.add_material(Material::matte(Vec3::new(0.4, 0.2, 0.1), 0.0));
    let metal = scene.add_material(Material {
        albedo: Vec3::new(0.7, 0.6, 0.5),
        metalness: 1.0,
        ..Default::default()
    });
    scene.add_instance(sphere, glass, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
    scene.add_instance(sphere, brown, Mat4::from_translation(Vec3::new(-4.0, 1.0, 0.0)));
    scene.add_instance(sphere, metal, Mat4::from_translation(Vec3::new(4.0, 1.0, 0.0)));

    let mut camera = Camera::look_at(
        Vec3::new(13.0, 2.0, 3.0),
        Vec3::ZERO,
        Vec3::Y,
        30f32.to_radians(),
    );
    camera.focal_distance = 10.0;
    camera.aperture = 0.05;
    scene.cameras.push(camera);
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometric_normal(vertices: &[Vertex], t: &Triangle) -> Vec3 {
        let [a, b, c] = t.indices.map(|i| vertices[i as usize].position);
        (b - a).cross(c - a)
    }

    #[test]
    fn sphere_winding_faces_outward() {
        let (vertices, triangles) = uv_sphere(2.0, 12, 8);
        for t in &triangles {
            let n = geometric_normal(&vertices, t);
            if n.length_squared() < 1e-10 {
                continue;
            }
            let center =
                t.indices.iter().map(|&i| vertices[i as usize].position).sum::<Vec3>() / 3.0;
            assert!(n.dot(center) > 0.0);
        }
    }

    #[test]
    fn cube_winding_matches_normals() {
        let (vertices, triangles) = cuboid();
        assert_eq!(triangles.len(), 12);
        for t in &triangles {
            let n = geometric_normal(&vertices, t).normalize();
            let shading = vertices[t.indices[0] as usize].normal;
            assert!(n.dot(shading) > 0.99);
        }
    }

    #[test]
    fn builtin_scenes_validate() {
        for scene in [cornell_box(), emissive_sphere(Vec3::ONE), random_spheres(42)] {
            let scene = scene.unwrap();
            assert_eq!(scene.validate(), Ok(()));
            assert_eq!(scene.cameras.len(), 1);
        }
    }
}
