pub mod gltf_loader;
pub mod mesh;
pub mod mesh_optimizer;
pub mod object;

use mesh::Aabb;
use object::Object;

/// Decoded 8-bit rgba image
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub objects: Vec<Object>,
    /// Referenced by index from [`mesh::MaterialTextures`]
    pub images: Vec<ImageData>,
}

impl Scene {
    /// World space bounds of all objects. `None` if there are no vertices.
    pub fn bounding_box(&self) -> Option<Aabb> {
        self.objects
            .iter()
            .filter(|o| !o.mesh.vertices.is_empty())
            .map(|o| o.mesh.bounding_box.transformed(o.model_matrix()))
            .reduce(|mut acc, aabb| {
                acc.union(&aabb);
                acc
            })
    }
}
