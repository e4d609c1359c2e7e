use super::mesh::Mesh;
use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A drawable mesh instance
#[derive(Clone, Debug, Default)]
pub struct Object {
    pub name: String,
    pub mesh: Mesh,
    pub transform: Transform,
    /// Registry id of the unified model buffer holding this object's data. Set on upload.
    pub buffer_id: Option<u32>,
    /// Byte offset of this object's [`ModelUniformBuffer`](crate::renderer::shader_interfaces::uniform_buffers::ModelUniformBuffer)
    /// in the unified model buffer. Set on upload.
    pub uniform_offset: u64,
}

impl Object {
    pub fn new(name: impl Into<String>, mesh: Mesh, transform: Transform) -> Self {
        Self {
            name: name.into(),
            mesh,
            transform,
            buffer_id: None,
            uniform_offset: 0,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }
}
