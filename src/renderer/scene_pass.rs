use super::{
    config_renderer::MAX_FRAMES_IN_FLIGHT,
    memory::{AllocationError, MemoryManager},
    shader_compiler::default_shader_stages,
    shader_interfaces::{
        uniform_buffers::{ModelUniformBuffer, SceneUniformBuffer},
        vertex_inputs::{Vertex, VulkanVertex},
    },
    vulkan_init::render_pass_indices,
};
use crate::scene::{mesh::MaterialTextures, object::Object};
use anyhow::Context;
use ash::vk;
use bort_vk::{
    AllocationAccess, ImageViewAccess,
    Buffer, ColorBlendState, CommandBuffer, DepthStencilState, DescriptorPool,
    DescriptorPoolProperties, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding,
    DescriptorSetLayoutProperties, Device, DeviceOwned, DynamicState, GraphicsPipeline,
    GraphicsPipelineProperties, ImageView, Image, PipelineAccess, PipelineLayout,
    PipelineLayoutProperties, RasterizationState, RenderPass, Sampler, ViewportState,
};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{mem, sync::Arc};

const MAX_DESC_SETS_PER_POOL: u32 = 128;

mod descriptor {
    pub const SET_OBJECT: usize = 0;
    pub const BINDING_SCENE_UBO: u32 = 0;
    pub const BINDING_MODEL_UBO: u32 = 1;
    /// Samplers follow in [`MaterialTextures::slots`](crate::scene::mesh::MaterialTextures::slots) order
    pub const BINDING_FIRST_TEXTURE: u32 = 2;
    pub const BINDING_COUNT: usize = 7;
}

/// Draws every loaded object into the offscreen target with one descriptor set per object.
pub struct ScenePass {
    device: Arc<Device>,
    pipeline: Arc<GraphicsPipeline>,

    descriptor_pools: Vec<Arc<DescriptorPool>>,
    /// Indexed by frame in flight, then by object
    object_desc_sets: Vec<Vec<Arc<DescriptorSet>>>,
    unused_desc_sets: Vec<Arc<DescriptorSet>>,

    /// One per frame in flight
    scene_uniform_buffers: Vec<Buffer>,
    /// Bound to material slots without a texture
    fallback_texture_id: Option<u32>,
}

impl ScenePass {
    pub fn new(
        device: Arc<Device>,
        memory_manager: &MemoryManager,
        render_pass: &RenderPass,
    ) -> anyhow::Result<Self> {
        let desc_set_layout = create_descriptor_layout(device.clone())?;
        let pipeline_layout = create_pipeline_layout(device.clone(), desc_set_layout)?;
        let pipeline = create_pipeline(pipeline_layout, render_pass)?;

        let descriptor_pool = create_descriptor_pool(device.clone())?;

        let scene_uniform_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|frame_index| {
                memory_manager.create_buffer(
                    mem::size_of::<SceneUniformBuffer>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    &format!("scene uniform {}", frame_index),
                )
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            device,
            pipeline,

            descriptor_pools: vec![descriptor_pool],
            object_desc_sets: vec![Vec::new(); MAX_FRAMES_IN_FLIGHT],
            unused_desc_sets: Vec::new(),

            scene_uniform_buffers,
            fallback_texture_id: None,
        })
    }

    pub fn update_scene_uniforms(
        &mut self,
        frame_index: usize,
        scene_ubo: SceneUniformBuffer,
    ) -> anyhow::Result<()> {
        let buffer = self
            .scene_uniform_buffers
            .get_mut(frame_index)
            .context("indexing scene uniform buffer")?;
        buffer
            .write_iter([scene_ubo], 0)
            .context("writing scene uniform buffer")?;
        Ok(())
    }

    /// (Re)writes one descriptor set per object per frame in flight. `image_textures` maps scene
    /// image indices to texture ids; `None` entries use the fallback texture.
    pub fn write_descriptor_sets(
        &mut self,
        objects: &[Object],
        image_textures: &[Option<u32>],
        memory_manager: &MemoryManager,
    ) -> anyhow::Result<()> {
        self.clear_descriptor_sets();
        let fallback_texture_id = self
            .fallback_texture_id
            .context("scene fallback texture hasn't been set")?;

        for frame_index in 0..MAX_FRAMES_IN_FLIGHT {
            let mut frame_desc_sets = Vec::with_capacity(objects.len());

            for object in objects {
                let desc_set = self.get_new_desc_set()?;

                let texture_ids =
                    texture_slot_ids(&object.mesh.material, image_textures, fallback_texture_id);
                let mut texture_views = Vec::with_capacity(texture_ids.len());
                for texture_id in texture_ids {
                    let view = memory_manager
                        .texture(texture_id)
                        .ok_or(AllocationError::UnknownId(texture_id))
                        .with_context(|| format!("writing texture descriptors of {}", object.name))?;
                    texture_views.push(view.as_ref());
                }

                let buffer_id = object
                    .buffer_id
                    .with_context(|| format!("{} has no models buffer", object.name))?;
                let models_buffer = memory_manager
                    .buffer(buffer_id)
                    .ok_or(AllocationError::UnknownId(buffer_id))?;

                write_object_desc_set(
                    &desc_set,
                    &self.scene_uniform_buffers[frame_index],
                    models_buffer,
                    object.uniform_offset,
                    &texture_views,
                    memory_manager.texture_sampler(),
                );

                frame_desc_sets.push(desc_set);
            }

            self.object_desc_sets[frame_index] = frame_desc_sets;
        }

        debug!(
            "wrote scene descriptor sets for {} objects",
            objects.len()
        );
        Ok(())
    }

    /// Moves every object descriptor set to the reuse list. Call before releasing the buffers
    /// and textures they reference.
    pub fn clear_descriptor_sets(&mut self) {
        for frame_desc_sets in &mut self.object_desc_sets {
            self.unused_desc_sets.append(frame_desc_sets);
        }
    }

    /// Must be called inside the scene subpass
    pub fn record_commands(
        &self,
        command_buffer: &CommandBuffer,
        frame_index: usize,
        viewport: vk::Viewport,
        scissor: vk::Rect2D,
        objects: &[Object],
        memory_manager: &MemoryManager,
    ) -> anyhow::Result<()> {
        let desc_sets = self
            .object_desc_sets
            .get(frame_index)
            .context("indexing scene descriptor sets")?;

        let device_ash = self.device.inner();
        let command_buffer_handle = command_buffer.handle();

        unsafe {
            device_ash.cmd_bind_pipeline(
                command_buffer_handle,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );
            device_ash.cmd_set_viewport(command_buffer_handle, 0, &[viewport]);
            device_ash.cmd_set_scissor(command_buffer_handle, 0, &[scissor]);
        }

        for (object, desc_set) in objects.iter().zip(desc_sets) {
            if object.mesh.indices.is_empty() {
                continue;
            }
            let Some(buffer_id) = object.buffer_id else {
                continue;
            };
            let models_buffer = memory_manager
                .buffer(buffer_id)
                .ok_or(AllocationError::UnknownId(buffer_id))
                .context("recording scene draw commands")?;

            unsafe {
                device_ash.cmd_bind_descriptor_sets(
                    command_buffer_handle,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.pipeline_layout().handle(),
                    0,
                    &[desc_set.handle()],
                    &[],
                );
                device_ash.cmd_bind_vertex_buffers(
                    command_buffer_handle,
                    0,
                    &[models_buffer.handle()],
                    &[object.mesh.vertex_offset],
                );
                device_ash.cmd_bind_index_buffer(
                    command_buffer_handle,
                    models_buffer.handle(),
                    object.mesh.index_offset,
                    vk::IndexType::UINT32,
                );
                device_ash.cmd_draw_indexed(
                    command_buffer_handle,
                    object.mesh.indices.len() as u32,
                    1,
                    0,
                    0,
                    0,
                );
            }
        }

        Ok(())
    }

    pub fn set_fallback_texture(&mut self, texture_id: u32) {
        self.fallback_texture_id = Some(texture_id);
    }

    pub fn fallback_texture_id(&self) -> Option<u32> {
        self.fallback_texture_id
    }
}

impl Drop for ScenePass {
    fn drop(&mut self) {
        trace!("dropping scene pass...");
    }
}

// Private functions

impl ScenePass {
    fn get_new_desc_set(&mut self) -> anyhow::Result<Arc<DescriptorSet>> {
        if let Some(existing_desc_set) = self.unused_desc_sets.pop() {
            return Ok(existing_desc_set);
        }
        self.allocate_desc_set()
    }

    fn allocate_desc_set(&mut self) -> anyhow::Result<Arc<DescriptorSet>> {
        let set_layout = self
            .pipeline
            .pipeline_layout()
            .properties()
            .set_layouts
            .get(descriptor::SET_OBJECT)
            .context("indexing scene pipeline descriptor set layout")?
            .clone();

        let last_pool = self
            .descriptor_pools
            .last()
            .context("scene pass has no descriptor pool")?;

        let desc_set = match last_pool.allocate_descriptor_set(set_layout.clone()) {
            Ok(desc_set) => desc_set,
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                debug!("creating new scene descriptor pool");
                let new_pool = create_descriptor_pool(self.device.clone())?;
                self.descriptor_pools.push(new_pool.clone());
                new_pool
                    .allocate_descriptor_set(set_layout)
                    .context("allocating scene descriptor set")?
            }
            Err(allocate_error) => {
                return Err(allocate_error).context("allocating scene descriptor set")
            }
        };

        Ok(Arc::new(desc_set))
    }
}

/// Texture id for each material sampler slot
fn texture_slot_ids(
    material: &MaterialTextures,
    image_textures: &[Option<u32>],
    fallback_texture_id: u32,
) -> [u32; MaterialTextures::SLOT_COUNT] {
    material.slots().map(|slot| {
        slot.and_then(|image_index| image_textures.get(image_index).copied().flatten())
            .unwrap_or(fallback_texture_id)
    })
}

fn write_object_desc_set(
    desc_set: &DescriptorSet,
    scene_uniform_buffer: &Buffer,
    models_buffer: &Buffer,
    model_uniform_offset: vk::DeviceSize,
    textures: &[&ImageView<Image>],
    sampler: &Sampler,
) {
    let scene_buffer_info = [vk::DescriptorBufferInfo {
        buffer: scene_uniform_buffer.handle(),
        offset: 0,
        range: mem::size_of::<SceneUniformBuffer>() as vk::DeviceSize,
    }];
    let model_buffer_info = [vk::DescriptorBufferInfo {
        buffer: models_buffer.handle(),
        offset: model_uniform_offset,
        range: mem::size_of::<ModelUniformBuffer>() as vk::DeviceSize,
    }];
    let texture_infos = textures
        .iter()
        .map(|image_view| {
            [vk::DescriptorImageInfo {
                image_view: image_view.handle(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                sampler: sampler.handle(),
            }]
        })
        .collect::<Vec<_>>();

    let mut descriptor_writes = vec![
        vk::WriteDescriptorSet::builder()
            .dst_set(desc_set.handle())
            .dst_binding(descriptor::BINDING_SCENE_UBO)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&scene_buffer_info)
            .build(),
        vk::WriteDescriptorSet::builder()
            .dst_set(desc_set.handle())
            .dst_binding(descriptor::BINDING_MODEL_UBO)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&model_buffer_info)
            .build(),
    ];
    for (slot, texture_info) in texture_infos.iter().enumerate() {
        descriptor_writes.push(
            vk::WriteDescriptorSet::builder()
                .dst_set(desc_set.handle())
                .dst_binding(descriptor::BINDING_FIRST_TEXTURE + slot as u32)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(texture_info)
                .build(),
        );
    }

    unsafe {
        desc_set
            .device()
            .inner()
            .update_descriptor_sets(&descriptor_writes, &[]);
    }
}

fn descriptor_layout_bindings() -> Vec<DescriptorSetLayoutBinding> {
    let uniform_binding = |binding| DescriptorSetLayoutBinding {
        binding,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::VERTEX,
        ..Default::default()
    };
    let texture_binding = |slot: usize| DescriptorSetLayoutBinding {
        binding: descriptor::BINDING_FIRST_TEXTURE + slot as u32,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    };

    let mut bindings = vec![
        uniform_binding(descriptor::BINDING_SCENE_UBO),
        uniform_binding(descriptor::BINDING_MODEL_UBO),
    ];
    bindings.extend((0..MaterialTextures::SLOT_COUNT).map(texture_binding));
    bindings
}

fn descriptor_pool_sizes(max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    vec![
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 2 * max_sets,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MaterialTextures::SLOT_COUNT as u32 * max_sets,
        },
    ]
}

fn create_descriptor_pool(device: Arc<Device>) -> anyhow::Result<Arc<DescriptorPool>> {
    let descriptor_pool_props = DescriptorPoolProperties {
        max_sets: MAX_DESC_SETS_PER_POOL,
        pool_sizes: descriptor_pool_sizes(MAX_DESC_SETS_PER_POOL),
        ..Default::default()
    };

    let descriptor_pool = DescriptorPool::new(device, descriptor_pool_props)
        .context("creating scene pass descriptor pool")?;
    Ok(Arc::new(descriptor_pool))
}

fn create_descriptor_layout(device: Arc<Device>) -> anyhow::Result<Arc<DescriptorSetLayout>> {
    let layout_props = DescriptorSetLayoutProperties::new_default(descriptor_layout_bindings());

    let desc_layout = DescriptorSetLayout::new(device, layout_props)
        .context("creating scene pass descriptor set layout")?;
    Ok(Arc::new(desc_layout))
}

fn create_pipeline_layout(
    device: Arc<Device>,
    desc_set_layout: Arc<DescriptorSetLayout>,
) -> anyhow::Result<Arc<PipelineLayout>> {
    let pipeline_layout_props = PipelineLayoutProperties::new(vec![desc_set_layout], Vec::new());

    let pipeline_layout = PipelineLayout::new(device, pipeline_layout_props)
        .context("creating scene pass pipeline layout")?;
    Ok(Arc::new(pipeline_layout))
}

fn create_pipeline(
    pipeline_layout: Arc<PipelineLayout>,
    render_pass: &RenderPass,
) -> anyhow::Result<Arc<GraphicsPipeline>> {
    let (vert_stage, frag_stage) = default_shader_stages(pipeline_layout.device())?;

    let color_blend_state =
        ColorBlendState::new_default(vec![ColorBlendState::blend_state_disabled()]);

    let depth_stencil_state = DepthStencilState {
        depth_test_enable: true,
        depth_write_enable: true,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        ..Default::default()
    };

    let rasterization_state = RasterizationState {
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.,
        ..Default::default()
    };

    let dynamic_state =
        DynamicState::new_default(vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);

    let pipeline_properties = GraphicsPipelineProperties {
        color_blend_state,
        depth_stencil_state,
        dynamic_state,
        rasterization_state,
        subpass_index: render_pass_indices::SUBPASS_SCENE as u32,
        vertex_input_state: Vertex::vertex_input_state(),
        viewport_state: ViewportState::new_dynamic(1, 1),
        ..Default::default()
    };

    let pipeline = GraphicsPipeline::new(
        pipeline_layout,
        pipeline_properties,
        &[vert_stage, frag_stage],
        render_pass,
        None,
    )
    .context("creating scene pass pipeline")?;

    Ok(Arc::new(pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_textures_use_fallback() {
        let material = MaterialTextures {
            albedo: Some(1),
            normal: Some(0),
            occlusion: None,
            emissive: Some(7),
            metallic_roughness: Some(2),
        };
        // image 2 failed to upload, image 7 doesn't exist
        let image_textures = [Some(10), Some(11), None];

        assert_eq!(
            texture_slot_ids(&material, &image_textures, 99),
            [11, 10, 99, 99, 99]
        );
        assert_eq!(
            texture_slot_ids(&MaterialTextures::default(), &image_textures, 5),
            [5; MaterialTextures::SLOT_COUNT]
        );
    }

    #[test]
    fn layout_has_uniforms_then_samplers() {
        let bindings = descriptor_layout_bindings();
        assert_eq!(bindings.len(), descriptor::BINDING_COUNT);

        for (i, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
            assert_eq!(binding.descriptor_count, 1);
        }
        for binding in &bindings[..2] {
            assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
        }
        for binding in &bindings[2..] {
            assert_eq!(
                binding.descriptor_type,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            );
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
        }
    }

    #[test]
    fn pool_sizes_cover_max_sets() {
        let sizes = descriptor_pool_sizes(4);
        let count_of = |ty| {
            sizes
                .iter()
                .filter(|s| s.ty == ty)
                .map(|s| s.descriptor_count)
                .sum::<u32>()
        };
        assert_eq!(count_of(vk::DescriptorType::UNIFORM_BUFFER), 8);
        assert_eq!(count_of(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 20);
    }
}
