use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

/// Should match `SceneUbo` in `scene.vert` and `scene.frag` (std140)
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneUniformBuffer {
    pub view: [f32; 16],
    pub projection: [f32; 16],
    /// Camera position in world space (w component unused)
    pub camera_position: [f32; 4],
    /// Direction light travels in world space (w component unused)
    pub light_direction: [f32; 4],
}

impl SceneUniformBuffer {
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3, light_direction: Vec3) -> Self {
        Self {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            camera_position: camera_position.extend(1.).to_array(),
            light_direction: light_direction.normalize_or_zero().extend(0.).to_array(),
        }
    }
}

/// Should match `ModelUbo` in `scene.vert` (std140)
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Pod, Zeroable)]
pub struct ModelUniformBuffer {
    pub model: [f32; 16],
    /// Inverse transpose of the model matrix, padded to a mat4
    pub normal_matrix: [f32; 16],
}

impl ModelUniformBuffer {
    pub fn new(model: Mat4) -> Self {
        let normal_matrix = Mat4::from_mat3(Mat3::from_mat4(model).inverse().transpose());
        Self {
            model: model.to_cols_array(),
            normal_matrix: normal_matrix.to_cols_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn std140_sizes() {
        assert_eq!(mem::size_of::<SceneUniformBuffer>(), 160);
        assert_eq!(mem::size_of::<ModelUniformBuffer>(), 128);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2., 1., 1.));
        let ubo = ModelUniformBuffer::new(model);
        let normal_matrix = Mat4::from_cols_array(&ubo.normal_matrix);
        let n = normal_matrix.transform_vector3(Vec3::X);
        assert!((n - Vec3::new(0.5, 0., 0.)).length() < 1e-6);
    }
}
