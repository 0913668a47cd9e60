//! Two-level BVH traversal with fixed-size stacks.

use glam::Vec3A;

use super::intersect::{intersect_aabb, intersect_triangle, SurfaceHit};
use super::SceneView;
use crate::bvh::BvhNode;
use crate::gpu::layout::GpuInstance;
use crate::ray::Ray;

/// Capacity of each traversal stack.
pub const STACK_SIZE: usize = 64;

/// Distance window of a ray query, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayLimits {
    /// Only applied when `first_hit` is set
    pub min_distance: f32,
    pub max_distance: f32,
    pub first_hit: bool,
}

/// Fixed-capacity stack of `(node, entry distance)` pairs.
struct NodeStack {
    entries: [(u32, f32); STACK_SIZE],
    len: usize,
}

impl NodeStack {
    fn new(root: u32) -> Self {
        let mut stack = Self {
            entries: [(0, 0.0); STACK_SIZE],
            len: 0,
        };
        stack.push(root, f32::NEG_INFINITY);
        stack
    }

    #[inline]
    fn push(&mut self, node: u32, near: f32) {
        // A full stack drops the entry; depth-first trees this deep do not
        // come out of the builders.
        if self.len < STACK_SIZE {
            self.entries[self.len] = (node, near);
            self.len += 1;
        }
    }

    #[inline]
    fn pop(&mut self) -> Option<(u32, f32)> {
        self.len = self.len.checked_sub(1)?;
        Some(self.entries[self.len])
    }
}

fn node_bounds(node: &BvhNode) -> (Vec3A, Vec3A) {
    (Vec3A::from_array(node.bbox_min), Vec3A::from_array(node.bbox_max))
}

/// Push the children of `index` so the nearer one is popped first; children
/// entered beyond `best` are skipped.
#[inline]
fn push_children(
    stack: &mut NodeStack,
    nodes: &[BvhNode],
    ray: &Ray,
    index: u32,
    node: &BvhNode,
    best: f32,
) {
    let left = index + 1;
    let right = index + node.right_offset;
    let hit = |i: u32| {
        let (min, max) = node_bounds(&nodes[i as usize]);
        intersect_aabb(ray, min, max)
            .map(|(near, _)| near)
            .filter(|&near| near <= best)
    };
    match (hit(left), hit(right)) {
        (Some(l), Some(r)) => {
            let ((near_node, near_t), (far_node, far_t)) = if r < l {
                ((right, r), (left, l))
            } else {
                ((left, l), (right, r))
            };
            stack.push(far_node, far_t);
            stack.push(near_node, near_t);
        }
        (Some(l), None) => stack.push(left, l),
        (None, Some(r)) => stack.push(right, r),
        (None, None) => {}
    }
}

/// Length of `distance` world units along `world_direction` once moved into
/// object space. An infinite distance stays infinite.
#[inline]
fn to_local_distance(instance: &GpuInstance, world_direction: Vec3A, distance: f32) -> f32 {
    distance
        * instance
            .transform_inverse()
            .transform_vector3a(world_direction)
            .length()
}

impl SceneView<'_> {
    /// Closest hit of `ray` against all instances, in world space.
    pub fn intersect(&self, ray: &Ray, limits: &RayLimits) -> Option<SurfaceHit> {
        let root_node = self.tlas_nodes.first()?;
        let mut best: Option<SurfaceHit> = None;
        let mut best_distance = limits.max_distance;

        let (min, max) = node_bounds(root_node);
        intersect_aabb(ray, min, max)?;

        let mut stack = NodeStack::new(0);
        while let Some((index, near)) = stack.pop() {
            if near > best_distance {
                continue;
            }
            let node = &self.tlas_nodes[index as usize];
            if node.is_leaf() {
                for slot in node.start..node.start + node.primitive_count {
                    let Some(instance) = self.instances.get(slot as usize) else {
                        continue;
                    };
                    let hit = self.intersect_instance(ray, instance, limits, best_distance);
                    if let Some(hit) = hit {
                        best_distance = hit.distance;
                        best = Some(hit);
                    }
                }
            } else {
                push_children(&mut stack, self.tlas_nodes, ray, index, node, best_distance);
            }
        }
        best
    }

    /// Closest hit inside one instance's BLAS that beats `best_distance`
    /// (world units). The hit is returned in world space.
    pub fn intersect_instance(
        &self,
        ray: &Ray,
        instance: &GpuInstance,
        limits: &RayLimits,
        best_distance: f32,
    ) -> Option<SurfaceHit> {
        let local_ray = ray.transformed(&instance.transform_inverse());
        let local_min = to_local_distance(instance, ray.direction, limits.min_distance);
        let mut local_best = to_local_distance(instance, ray.direction, best_distance);
        let node_offset = instance.node_offset as u32;
        let triangle_offset = instance.triangle_offset as usize;

        let mut closest: Option<SurfaceHit> = None;
        let mut stack = NodeStack::new(node_offset);
        while let Some((index, near)) = stack.pop() {
            if near > local_best {
                continue;
            }
            let Some(node) = self.blas_nodes.get(index as usize) else {
                continue;
            };
            if node.is_leaf() {
                for i in node.start..node.start + node.primitive_count {
                    let Some(triangle) = self.triangles.get(triangle_offset + i as usize) else {
                        continue;
                    };
                    let [a, b, c] = triangle.indices;
                    let (Some(v0), Some(v1), Some(v2)) = (
                        self.vertices.get(a as usize),
                        self.vertices.get(b as usize),
                        self.vertices.get(c as usize),
                    ) else {
                        continue;
                    };
                    if let Some(hit) = intersect_triangle(&local_ray, v0, v1, v2) {
                        let clipped = limits.first_hit && hit.distance < local_min;
                        if hit.distance < local_best && !clipped {
                            local_best = hit.distance;
                            closest = Some(hit);
                        }
                    }
                }
            } else if (index + node.right_offset) as usize >= self.blas_nodes.len() {
                continue;
            } else {
                push_children(&mut stack, self.blas_nodes, &local_ray, index, node, local_best);
            }
        }

        let local = closest?;
        let transform = instance.transform();
        let normal_matrix = instance.transform_inverse().transpose();
        let position = transform.transform_point3a(local.position);
        let distance = (position - ray.origin).length();
        if distance >= best_distance {
            return None;
        }
        Some(SurfaceHit {
            distance,
            position,
            normal: normal_matrix.transform_vector3a(local.normal).normalize_or(local.normal),
            tangent: transform.transform_vector3a(local.tangent).normalize_or(local.tangent),
            bitangent: transform.transform_vector3a(local.bitangent).normalize_or(local.bitangent),
            material_id: instance.material_id as u32,
            ..local
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::{tlas, Aabb};
    use crate::gpu::layout::{GpuMaterial, GpuMesh, GpuTriangle, GpuVertex};
    use crate::kernel::texture::TextureView;
    use crate::scene::{Scene, Triangle, Vertex};
    use glam::{Mat4, Quat, Vec2, Vec3};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Host copies of the buffers a device would receive.
    struct Buffers {
        vertices: Vec<GpuVertex>,
        triangles: Vec<GpuTriangle>,
        meshes: Vec<GpuMesh>,
        instances: Vec<GpuInstance>,
        materials: Vec<GpuMaterial>,
        blas_nodes: Vec<BvhNode>,
        tlas_nodes: Vec<BvhNode>,
    }

    impl Buffers {
        fn new(scene: &Scene) -> Self {
            let tlas = tlas::build(&scene.instance_bounds());
            let instances = tlas
                .order
                .iter()
                .map(|&i| {
                    let instance = &scene.instances[i as usize];
                    GpuInstance::new(instance, &scene.meshes[instance.mesh_id as usize])
                })
                .collect();
            Self {
                vertices: scene.vertices.iter().map(GpuVertex::from).collect(),
                triangles: scene.triangles.iter().map(GpuTriangle::from).collect(),
                meshes: scene.meshes.iter().map(GpuMesh::from).collect(),
                instances,
                materials: scene.materials.iter().map(GpuMaterial::from).collect(),
                blas_nodes: scene.blas_nodes.clone(),
                tlas_nodes: tlas.nodes,
            }
        }

        fn view(&self) -> SceneView<'_> {
            SceneView {
                vertices: &self.vertices,
                triangles: &self.triangles,
                meshes: &self.meshes,
                instances: &self.instances,
                materials: &self.materials,
                blas_nodes: &self.blas_nodes,
                tlas_nodes: &self.tlas_nodes,
                textures: TextureView::EMPTY,
                environment: TextureView::EMPTY,
            }
        }
    }

    fn random_point(rng: &mut ChaCha8Rng, extent: f32) -> Vec3 {
        Vec3::new(
            rng.random_range(-extent..extent),
            rng.random_range(-extent..extent),
            rng.random_range(-extent..extent),
        )
    }

    fn triangle_soup(rng: &mut ChaCha8Rng, count: usize) -> (Vec<Vertex>, Vec<Triangle>) {
        let mut vertices = Vec::with_capacity(count * 3);
        let mut triangles = Vec::with_capacity(count);
        for i in 0..count as u32 {
            let center = random_point(rng, 1.0);
            for _ in 0..3 {
                let p = center + random_point(rng, 0.2);
                vertices.push(Vertex::new(p, Vec3::Y, Vec2::ZERO));
            }
            triangles.push(Triangle::new(3 * i, 3 * i + 1, 3 * i + 2));
        }
        (vertices, triangles)
    }

    fn random_scene(rng: &mut ChaCha8Rng) -> Scene {
        let mut scene = Scene::new("soup");
        let material = scene.add_material(crate::scene::Material::default());
        for m in 0..2 {
            let (vertices, triangles) = triangle_soup(rng, 150);
            let mesh = scene.add_mesh(format!("soup{m}"), &vertices, &triangles).unwrap();
            for _ in 0..4 {
                // Rigid motion with uniform scale keeps the edge-on tolerance
                // identical in object and world space.
                let transform = Mat4::from_scale_rotation_translation(
                    Vec3::splat(rng.random_range(0.5..2.0)),
                    Quat::from_euler(
                        glam::EulerRot::YXZ,
                        rng.random_range(-3.0..3.0),
                        rng.random_range(-3.0..3.0),
                        rng.random_range(-3.0..3.0),
                    ),
                    random_point(rng, 4.0),
                );
                scene.add_instance(mesh, material, transform);
            }
        }
        scene
    }

    /// Closest world-space distance over every placed triangle.
    fn brute_force(scene: &Scene, ray: &Ray) -> Option<f32> {
        let mut best: Option<f32> = None;
        for instance in &scene.instances {
            let mesh = &scene.meshes[instance.mesh_id as usize];
            let first = mesh.triangle_offset as usize;
            for triangle in &scene.triangles[first..first + mesh.triangle_count as usize] {
                let [a, b, c] = triangle.indices.map(|i| {
                    let vertex = &scene.vertices[i as usize];
                    GpuVertex {
                        position: instance.transform().transform_point3(vertex.position).to_array(),
                        ..GpuVertex::from(vertex)
                    }
                });
                if let Some(hit) = intersect_triangle(ray, &a, &b, &c) {
                    if best.map_or(true, |d| hit.distance < d) {
                        best = Some(hit.distance);
                    }
                }
            }
        }
        best
    }

    const UNLIMITED: RayLimits = RayLimits {
        min_distance: 0.0,
        max_distance: f32::INFINITY,
        first_hit: false,
    };

    #[test]
    fn traversal_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let scene = random_scene(&mut rng);
        let buffers = Buffers::new(&scene);
        let view = buffers.view();

        let mut hits = 0;
        let mut mismatches = 0;
        for _ in 0..400 {
            let origin = random_point(&mut rng, 8.0);
            let target = random_point(&mut rng, 3.0);
            let ray = Ray::new(origin.into(), (target - origin).normalize().into());
            let expected = brute_force(&scene, &ray);
            let actual = view.intersect(&ray, &UNLIMITED).map(|hit| hit.distance);
            match (expected, actual) {
                (Some(e), Some(a)) if (e - a).abs() <= 1e-3 * e.max(1.0) => hits += 1,
                (None, None) => {}
                // Rays through a shared edge may pick either side after the
                // object-space transform.
                _ => mismatches += 1,
            }
        }
        assert!(hits > 40, "only {hits} rays hit the scene");
        assert!(mismatches <= 2, "{mismatches} rays disagree with brute force");
    }

    #[test]
    fn max_distance_cuts_hits() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let scene = random_scene(&mut rng);
        let buffers = Buffers::new(&scene);
        let view = buffers.view();
        let origin = Vec3A::new(0.0, 0.0, 20.0);
        let bounds = scene
            .instance_bounds()
            .iter()
            .fold(Aabb::empty(), |acc, b| acc.union(b));
        let ray = Ray::new(origin, (Vec3A::from(bounds.center()) - origin).normalize());
        let Some(hit) = view.intersect(&ray, &UNLIMITED) else {
            return;
        };
        let limited = RayLimits {
            max_distance: hit.distance * 0.99,
            ..UNLIMITED
        };
        assert!(view.intersect(&ray, &limited).is_none());
    }

    #[test]
    fn empty_tlas_misses() {
        let buffers = Buffers::new(&Scene::new("empty"));
        let ray = Ray::new(Vec3A::ZERO, Vec3A::X);
        assert!(buffers.view().intersect(&ray, &UNLIMITED).is_none());
    }

    #[test]
    fn hits_report_instance_material() {
        let mut scene = Scene::new("quads");
        let (vertices, triangles) = crate::scene::procedural::quad();
        let mesh = scene.add_mesh("quad", &vertices, &triangles).unwrap();
        let near = scene.add_material(crate::scene::Material::matte(Vec3::ONE, 0.0));
        let far = scene.add_material(crate::scene::Material::mirror());
        scene.add_instance(mesh, far, Mat4::from_translation(Vec3::new(0.0, -3.0, 0.0)));
        scene.add_instance(mesh, near, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));
        let buffers = Buffers::new(&scene);

        let ray = Ray::new(Vec3A::new(0.1, 5.0, 0.1), Vec3A::NEG_Y);
        let hit = buffers.view().intersect(&ray, &UNLIMITED).unwrap();
        assert_eq!(hit.material_id, near);
        assert!((hit.distance - 6.0).abs() < 1e-4);
        assert!(hit.normal.abs_diff_eq(Vec3A::Y, 1e-5));
        assert!(hit.front_face);
    }

    #[test]
    fn unbounded_axis_aligned_rays_hit() {
        let mut scene = Scene::new("wall");
        let (vertices, triangles) = crate::scene::procedural::quad();
        let mesh = scene.add_mesh("quad", &vertices, &triangles).unwrap();
        let material = scene.add_material(crate::scene::Material::default());
        // A 4x4 wall in the x = 1 plane facing -X.
        let transform = Mat4::from_translation(Vec3::X)
            * Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2)
            * Mat4::from_scale(Vec3::splat(4.0));
        scene.add_instance(mesh, material, transform);
        let buffers = Buffers::new(&scene);
        let view = buffers.view();

        let origin = Vec3A::new(-10.0, 0.1, 0.1);
        let straight = view.intersect(&Ray::new(origin, Vec3A::X), &UNLIMITED).unwrap();
        assert!((straight.distance - 11.0).abs() < 1e-4);
        assert!(straight.normal.abs_diff_eq(Vec3A::NEG_X, 1e-5));

        let tilted = Ray::new(origin, Vec3A::new(1.0, 0.001, 0.0));
        let hit = view.intersect(&tilted, &UNLIMITED).unwrap();
        assert!((hit.distance - 11.0).abs() < 1e-3);
    }

    #[test]
    fn min_distance_only_clips_first_hit() {
        let mut scene = Scene::new("quads");
        let (vertices, triangles) = crate::scene::procedural::quad();
        let mesh = scene.add_mesh("quad", &vertices, &triangles).unwrap();
        let near = scene.add_material(crate::scene::Material::matte(Vec3::ONE, 0.0));
        let far = scene.add_material(crate::scene::Material::mirror());
        scene.add_instance(mesh, far, Mat4::from_translation(Vec3::new(0.0, -3.0, 0.0)));
        scene.add_instance(mesh, near, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));
        let buffers = Buffers::new(&scene);
        let view = buffers.view();
        let ray = Ray::new(Vec3A::new(0.1, 5.0, 0.1), Vec3A::NEG_Y);

        let clipped = RayLimits {
            min_distance: 7.0,
            first_hit: true,
            ..UNLIMITED
        };
        let hit = view.intersect(&ray, &clipped).unwrap();
        assert_eq!(hit.material_id, far);
        assert!((hit.distance - 8.0).abs() < 1e-4);

        let later_bounce = RayLimits {
            first_hit: false,
            ..clipped
        };
        let hit = view.intersect(&ray, &later_bounce).unwrap();
        assert_eq!(hit.material_id, near);
        assert!((hit.distance - 6.0).abs() < 1e-4);
    }
}
