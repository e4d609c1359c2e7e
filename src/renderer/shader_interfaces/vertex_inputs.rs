use ash::vk;
use bort_vk::VertexInputState;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use memoffset::offset_of;
use std::mem;

/// Describes how a vertex type is laid out in a single interleaved vertex buffer (binding 0)
pub trait VulkanVertex {
    fn vertex_input_state() -> VertexInputState;
}

/// Should match inputs in `scene.vert`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub color: [f32; 4],
    pub tangent: [f32; 4],
}

impl Vertex {
    pub const DEFAULT_NORMAL: [f32; 3] = [0., 0., 1.];
    pub const DEFAULT_COLOR: [f32; 4] = [1.; 4];
    pub const DEFAULT_TANGENT: [f32; 4] = [1., 0., 0., 1.];

    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2, color: Vec4, tangent: Vec4) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tex_coord: tex_coord.to_array(),
            color: color.to_array(),
            tangent: tangent.to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.; 3],
            normal: Self::DEFAULT_NORMAL,
            tex_coord: [0.; 2],
            color: Self::DEFAULT_COLOR,
            tangent: Self::DEFAULT_TANGENT,
        }
    }
}

impl VulkanVertex for Vertex {
    fn vertex_input_state() -> VertexInputState {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format,
                offset: offset as u32,
            }
        };

        VertexInputState {
            vertex_binding_descriptions: vec![binding],
            vertex_attribute_descriptions: vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
                attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
                attribute(3, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, color)),
                attribute(4, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, tangent)),
            ],
            ..Default::default()
        }
    }
}

/// Should match vertex definition for `overlay.vert` (egui color is converted to `[f32; 4]`)
#[repr(C)]
#[derive(Default, Debug, Clone, Copy, Zeroable, Pod)]
pub struct EguiVertex {
    pub in_position: [f32; 2],
    pub in_tex_coords: [f32; 2],
    pub in_color: [f32; 4],
}

impl EguiVertex {
    /// Color stays gamma encoded and premultiplied
    pub fn from_egui_vertex(egui_vertex: &egui::epaint::Vertex) -> Self {
        let color = egui_vertex.color.to_array().map(|c| c as f32 / 255.);
        Self {
            in_position: [egui_vertex.pos.x, egui_vertex.pos.y],
            in_tex_coords: [egui_vertex.uv.x, egui_vertex.uv.y],
            in_color: color,
        }
    }
}

impl VulkanVertex for EguiVertex {
    fn vertex_input_state() -> VertexInputState {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        VertexInputState {
            vertex_binding_descriptions: vec![binding],
            vertex_attribute_descriptions: vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(Self, in_position) as u32,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(Self, in_tex_coords) as u32,
                },
                vk::VertexInputAttributeDescription {
                    location: 2,
                    binding: 0,
                    format: vk::Format::R32G32B32A32_SFLOAT,
                    offset: offset_of!(Self, in_color) as u32,
                },
            ],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_vertex_is_tightly_packed() {
        assert_eq!(mem::size_of::<Vertex>(), 64);

        let state = Vertex::vertex_input_state();
        let offsets: Vec<u32> = state
            .vertex_attribute_descriptions
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 48]);
        let locations: Vec<u32> = state
            .vertex_attribute_descriptions
            .iter()
            .map(|a| a.location)
            .collect();
        assert_eq!(locations, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn default_vertex_attributes() {
        let v = Vertex::default();
        assert_eq!(v.normal, [0., 0., 1.]);
        assert_eq!(v.color, [1., 1., 1., 1.]);
        assert_eq!(v.tangent, [1., 0., 0., 1.]);
    }

    #[test]
    fn egui_vertex_color_is_normalized() {
        let egui_vertex = egui::epaint::Vertex {
            pos: egui::pos2(4., 8.),
            uv: egui::pos2(0.5, 0.25),
            color: egui::Color32::from_rgba_premultiplied(255, 0, 51, 255),
        };
        let v = EguiVertex::from_egui_vertex(&egui_vertex);
        assert_eq!(v.in_position, [4., 8.]);
        assert_eq!(v.in_tex_coords, [0.5, 0.25]);
        assert_eq!(v.in_color, [1., 0., 0.2, 1.]);
    }
}
