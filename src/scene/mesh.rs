use crate::renderer::shader_interfaces::vertex_inputs::Vertex;
use glam::{Mat4, Vec3};

/// Axis aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// positive corner
    pub max: Vec3,
    /// negative corner
    pub min: Vec3,
}

impl Aabb {
    pub fn new_zero() -> Self {
        Self {
            max: Vec3::ZERO,
            min: Vec3::ZERO,
        }
    }

    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        let mut positions = vertices.iter().map(Vertex::position);
        let Some(first) = positions.next() else {
            return Self::new_zero();
        };
        positions.fold(Self { max: first, min: first }, |mut aabb, p| {
            aabb.max = aabb.max.max(p);
            aabb.min = aabb.min.min(p);
            aabb
        })
    }

    pub fn union(&mut self, aabb: &Aabb) {
        self.max = self.max.max(aabb.max);
        self.min = self.min.min(aabb.min);
    }

    /// Bounds of the 8 transformed corners
    pub fn transformed(&self, transform: Mat4) -> Self {
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        let mut out = Self {
            max: Vec3::splat(f32::MIN),
            min: Vec3::splat(f32::MAX),
        };
        for corner in corners {
            let p = transform.transform_point3(corner);
            out.max = out.max.max(p);
            out.min = out.min.min(p);
        }
        out
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new_zero()
    }
}

/// Indices into [`super::Scene::images`] for each material sampler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub albedo: Option<usize>,
    pub normal: Option<usize>,
    pub occlusion: Option<usize>,
    pub emissive: Option<usize>,
    pub metallic_roughness: Option<usize>,
}

impl MaterialTextures {
    pub const SLOT_COUNT: usize = 5;

    /// In descriptor binding order (albedo, normal, occlusion, emissive, metallic-roughness)
    pub fn slots(&self) -> [Option<usize>; Self::SLOT_COUNT] {
        [
            self.albedo,
            self.normal,
            self.occlusion,
            self.emissive,
            self.metallic_roughness,
        ]
    }
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Byte offset of the vertices in the unified model buffer. Set on upload.
    pub vertex_offset: u64,
    /// Byte offset of the indices in the unified model buffer. Set on upload.
    pub index_offset: u64,
    pub bounding_box: Aabb,
    pub material: MaterialTextures,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, material: MaterialTextures) -> Self {
        let bounding_box = Aabb::from_vertices(&vertices);
        Self {
            vertices,
            indices,
            vertex_offset: 0,
            index_offset: 0,
            bounding_box,
            material,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
