//! egui backend. Texture uploads are recorded on the frame's command buffer before the render
//! passes begin.

use super::{
    config_renderer::MAX_FRAMES_IN_FLIGHT,
    memory::MemoryManager,
    shader_compiler::overlay_shader_stages,
    shader_interfaces::{
        push_constants::OverlayPushConstant,
        vertex_inputs::{EguiVertex, VulkanVertex},
    },
    vulkan_init::render_pass_indices,
};
use ahash::AHashMap;
use anyhow::Context;
use ash::vk;
use bort_vk::{
    AllocationAccess,
    allocation_info_from_flags, default_subresource_layers, Buffer, ColorBlendState,
    CommandBuffer, DescriptorPool, DescriptorPoolProperties, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutBinding, DescriptorSetLayoutProperties, Device, DeviceOwned, DynamicState,
    GraphicsPipeline, GraphicsPipelineProperties, Image, ImageAccess, ImageDimensions,
    ImageProperties, ImageView, ImageViewAccess, ImageViewProperties, PipelineAccess,
    PipelineLayout, PipelineLayoutProperties, RenderPass, Sampler, SamplerProperties,
    ViewportState,
};
use egui::{epaint::Primitive, ClippedPrimitive, Rect, TextureId, TexturesDelta};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{mem, sync::Arc};

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
const MAX_DESC_SETS_PER_POOL: u32 = 64;
/// Estimate of a pretty busy gui: 8192 vertices
const INITIAL_VERTEX_CAPACITY: vk::DeviceSize =
    8192 * mem::size_of::<EguiVertex>() as vk::DeviceSize;
/// Estimate of a pretty busy gui: 16384 indices
const INITIAL_INDEX_CAPACITY: vk::DeviceSize = 16384 * mem::size_of::<u32>() as vk::DeviceSize;

mod descriptor {
    pub const SET_TEXTURE: usize = 0;
    pub const BINDING_TEXTURE: u32 = 0;
}

pub struct OverlayPass {
    device: Arc<Device>,
    pipeline: Arc<GraphicsPipeline>,

    descriptor_pools: Vec<Arc<DescriptorPool>>,
    unused_texture_desc_sets: Vec<Arc<DescriptorSet>>,

    texture_sampler: Arc<Sampler>,
    textures: AHashMap<TextureId, OverlayTexture>,

    frames: Vec<FrameResources>,

    scale_factor: f32,
    primitives: Vec<ClippedPrimitive>,
}

struct OverlayTexture {
    image_view: Arc<ImageView<Image>>,
    desc_set: Arc<DescriptorSet>,
}

/// Resources that may be in use until the frame's fence has signalled
#[derive(Default)]
struct FrameResources {
    vertex_buffer: GrowableBuffer,
    index_buffer: GrowableBuffer,
    staging_buffers: Vec<Buffer>,
    retired_textures: Vec<OverlayTexture>,
}

#[derive(Default)]
struct GrowableBuffer {
    buffer: Option<Buffer>,
    capacity: vk::DeviceSize,
}

// Public functions

impl OverlayPass {
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        scale_factor: f32,
    ) -> anyhow::Result<Self> {
        let descriptor_pool = create_descriptor_pool(device.clone())?;
        let desc_set_layout = create_descriptor_layout(device.clone())?;

        let pipeline_layout = create_pipeline_layout(device.clone(), desc_set_layout)?;
        let pipeline = create_pipeline(pipeline_layout, render_pass)?;

        let texture_sampler = create_texture_sampler(device.clone())?;

        Ok(Self {
            device,
            pipeline,

            descriptor_pools: vec![descriptor_pool],
            unused_texture_desc_sets: Vec::new(),

            texture_sampler,
            textures: AHashMap::default(),

            frames: (0..MAX_FRAMES_IN_FLIGHT)
                .map(|_| FrameResources::default())
                .collect(),

            scale_factor,
            primitives: Vec::new(),
        })
    }

    /// Frees staging buffers and textures retired by the previous use of this frame slot. Call
    /// after waiting on the frame's fence.
    pub fn begin_frame(&mut self, frame_index: usize) {
        let Some(frame) = self.frames.get_mut(frame_index) else {
            return;
        };
        frame.staging_buffers.clear();
        for retired in frame.retired_textures.drain(..) {
            self.unused_texture_desc_sets.push(retired.desc_set);
        }
    }

    /// Records texture creation, partial updates and frees output by
    /// [`egui::Context::end_frame`]. Must be recorded outside of a render pass.
    pub fn update_textures(
        &mut self,
        command_buffer: &CommandBuffer,
        frame_index: usize,
        textures_delta: Vec<TexturesDelta>,
        memory_manager: &MemoryManager,
    ) -> anyhow::Result<()> {
        for textures_delta in textures_delta {
            for (id, image_delta) in textures_delta.set {
                self.process_texture_data(command_buffer, frame_index, id, image_delta, memory_manager)?;
            }

            for id in textures_delta.free {
                self.retire_texture(frame_index, id);
            }
        }
        Ok(())
    }

    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.scale_factor = scale_factor;
    }

    pub fn set_primitives(&mut self, primitives: Vec<ClippedPrimitive>) {
        self.primitives = primitives;
    }

    /// Must be called inside the overlay subpass
    pub fn record_render_commands(
        &mut self,
        command_buffer: &CommandBuffer,
        frame_index: usize,
        write_linear_color: bool,
        framebuffer_dimensions: [f32; 2],
        memory_manager: &MemoryManager,
    ) -> anyhow::Result<()> {
        let meshes = drawable_meshes(&self.primitives, |id| self.textures.contains_key(&id));
        if meshes.is_empty() {
            return Ok(());
        }

        let vertex_count: usize = meshes.iter().map(|(_, m)| m.vertices.len()).sum();
        let index_count: usize = meshes.iter().map(|(_, m)| m.indices.len()).sum();

        let frame = self
            .frames
            .get_mut(frame_index)
            .context("indexing overlay frame resources")?;
        let vertex_buffer = frame.vertex_buffer.reserve(
            (vertex_count * mem::size_of::<EguiVertex>()) as vk::DeviceSize,
            INITIAL_VERTEX_CAPACITY,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "overlay vertices",
            memory_manager,
        )?;
        let mut draws = Vec::with_capacity(meshes.len());
        let mut vertex_offset = 0_usize;
        let mut first_index = 0_usize;
        for (clip_rect, mesh) in &meshes {
            vertex_buffer
                .write_iter(
                    mesh.vertices.iter().map(EguiVertex::from_egui_vertex),
                    vertex_offset * mem::size_of::<EguiVertex>(),
                )
                .context("uploading overlay vertices")?;
            draws.push(MeshDraw {
                texture_id: mesh.texture_id,
                clip_rect: *clip_rect,
                first_index: first_index as u32,
                index_count: mesh.indices.len() as u32,
                vertex_offset: vertex_offset as i32,
            });
            vertex_offset += mesh.vertices.len();
            first_index += mesh.indices.len();
        }
        let vertex_buffer_handle = vertex_buffer.handle();

        let index_buffer = frame.index_buffer.reserve(
            (index_count * mem::size_of::<u32>()) as vk::DeviceSize,
            INITIAL_INDEX_CAPACITY,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "overlay indices",
            memory_manager,
        )?;
        for (draw, (_, mesh)) in draws.iter().zip(&meshes) {
            index_buffer
                .write_iter(
                    mesh.indices.iter().copied(),
                    draw.first_index as usize * mem::size_of::<u32>(),
                )
                .context("uploading overlay indices")?;
        }
        let index_buffer_handle = index_buffer.handle();

        let push_constant_data = OverlayPushConstant::new(
            [
                framebuffer_dimensions[0] / self.scale_factor,
                framebuffer_dimensions[1] / self.scale_factor,
            ],
            write_linear_color,
        );

        let viewport = vk::Viewport {
            x: 0.,
            y: 0.,
            width: framebuffer_dimensions[0],
            height: framebuffer_dimensions[1],
            min_depth: 0.,
            max_depth: 1.,
        };

        let device_ash = self.device.inner();
        let command_buffer_handle = command_buffer.handle();
        let pipeline_layout_handle = self.pipeline.pipeline_layout().handle();

        unsafe {
            device_ash.cmd_bind_pipeline(
                command_buffer_handle,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );
            device_ash.cmd_set_viewport(command_buffer_handle, 0, &[viewport]);
            device_ash.cmd_push_constants(
                command_buffer_handle,
                pipeline_layout_handle,
                vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push_constant_data),
            );
            device_ash.cmd_bind_vertex_buffers(
                command_buffer_handle,
                0,
                &[vertex_buffer_handle],
                &[0],
            );
            device_ash.cmd_bind_index_buffer(
                command_buffer_handle,
                index_buffer_handle,
                0,
                vk::IndexType::UINT32,
            );
        }

        for draw in draws {
            let Some(texture) = self.textures.get(&draw.texture_id) else {
                continue;
            };

            let scissor = calculate_gui_element_scissor(
                self.scale_factor,
                framebuffer_dimensions,
                draw.clip_rect,
            );
            if scissor.extent.width == 0 || scissor.extent.height == 0 {
                continue;
            }

            unsafe {
                device_ash.cmd_set_scissor(command_buffer_handle, 0, &[scissor]);
                device_ash.cmd_bind_descriptor_sets(
                    command_buffer_handle,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline_layout_handle,
                    0,
                    &[texture.desc_set.handle()],
                    &[],
                );
                device_ash.cmd_draw_indexed(
                    command_buffer_handle,
                    draw.index_count,
                    1,
                    draw.first_index,
                    draw.vertex_offset,
                    0,
                );
            }
        }

        Ok(())
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl Drop for OverlayPass {
    fn drop(&mut self) {
        trace!("dropping overlay pass...");
    }
}

// Private functions

impl OverlayPass {
    fn process_texture_data(
        &mut self,
        command_buffer: &CommandBuffer,
        frame_index: usize,
        texture_id: TextureId,
        delta: egui::epaint::ImageDelta,
        memory_manager: &MemoryManager,
    ) -> anyhow::Result<()> {
        let data = egui_image_rgba(&delta.image);
        if data.is_empty() {
            info!(
                "attempted to create overlay texture with no data! skipping... texture_id = {:?}",
                texture_id
            );
            return Ok(());
        }
        let [width, height] = delta.image.size().map(|d| d as u32);

        let mut staging_buffer = memory_manager.create_buffer(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "overlay texture staging",
        )?;
        staging_buffer
            .write_iter(data, 0)
            .context("uploading overlay texture data to staging buffer")?;

        match delta.pos {
            Some(update_pos) => {
                // a subregion of an existing texture e.g. new glyphs added to the font atlas
                let Some(existing) = self.textures.get(&texture_id) else {
                    warn!(
                        "overlay texture update for unknown texture id = {:?}. skipping...",
                        texture_id
                    );
                    return Ok(());
                };
                trace!(
                    "updating overlay texture. id = {:?}, offset = {:?}, size = {}x{}",
                    texture_id,
                    update_pos,
                    width,
                    height
                );

                let copy_region = buffer_image_copy(
                    [update_pos[0] as i32, update_pos[1] as i32],
                    [width, height],
                );
                record_texture_upload(
                    &self.device,
                    command_buffer,
                    &existing.image_view,
                    &staging_buffer,
                    copy_region,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
            None => {
                debug!("creating new overlay texture. id = {:?}", texture_id);

                let image_view = create_texture_image(memory_manager, [width, height])?;
                record_texture_upload(
                    &self.device,
                    command_buffer,
                    &image_view,
                    &staging_buffer,
                    buffer_image_copy([0, 0], [width, height]),
                    vk::ImageLayout::UNDEFINED,
                );

                let desc_set = self.get_new_texture_desc_set()?;
                write_texture_desc_set(&desc_set, &image_view, &self.texture_sampler);

                // a replaced texture may still be referenced by in-flight frames
                if let Some(replaced) = self.textures.insert(
                    texture_id,
                    OverlayTexture {
                        image_view,
                        desc_set,
                    },
                ) {
                    self.frames[frame_index].retired_textures.push(replaced);
                }
            }
        }

        self.frames[frame_index].staging_buffers.push(staging_buffer);
        Ok(())
    }

    fn retire_texture(&mut self, frame_index: usize, texture_id: TextureId) {
        debug!("removing unneeded overlay texture id = {:?}", texture_id);
        if let Some(texture) = self.textures.remove(&texture_id) {
            self.frames[frame_index].retired_textures.push(texture);
        }
    }

    fn get_new_texture_desc_set(&mut self) -> anyhow::Result<Arc<DescriptorSet>> {
        if let Some(existing_desc_set) = self.unused_texture_desc_sets.pop() {
            return Ok(existing_desc_set);
        }

        let set_layout = self
            .pipeline
            .pipeline_layout()
            .properties()
            .set_layouts
            .get(descriptor::SET_TEXTURE)
            .context("indexing overlay pipeline descriptor set layout")?
            .clone();

        let last_pool = self
            .descriptor_pools
            .last()
            .context("overlay pass has no descriptor pool")?;

        let desc_set = match last_pool.allocate_descriptor_set(set_layout.clone()) {
            Ok(desc_set) => desc_set,
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                let new_pool = create_descriptor_pool(self.device.clone())?;
                self.descriptor_pools.push(new_pool.clone());
                new_pool
                    .allocate_descriptor_set(set_layout)
                    .context("allocating descriptor set for new overlay texture")?
            }
            Err(allocate_error) => {
                return Err(allocate_error)
                    .context("allocating descriptor set for new overlay texture")
            }
        };

        Ok(Arc::new(desc_set))
    }
}

impl GrowableBuffer {
    /// Returns a buffer of at least `required` bytes, recreating it if the current one is too small
    fn reserve(
        &mut self,
        required: vk::DeviceSize,
        initial_capacity: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        identifier: &str,
        memory_manager: &MemoryManager,
    ) -> anyhow::Result<&mut Buffer> {
        if self.buffer.is_none() || required > self.capacity {
            let capacity = grown_capacity(required, self.capacity.max(initial_capacity));
            if self.buffer.is_some() {
                debug!("growing {} buffer to {} bytes", identifier, capacity);
            }
            self.buffer = Some(memory_manager.create_buffer(capacity, usage, identifier)?);
            self.capacity = capacity;
        }
        self.buffer
            .as_mut()
            .with_context(|| format!("{} buffer missing", identifier))
    }
}

struct MeshDraw {
    texture_id: TextureId,
    clip_rect: Rect,
    first_index: u32,
    index_count: u32,
    vertex_offset: i32,
}

/// Non-empty meshes whose texture exists. A mesh referencing a texture that was never created (or
/// has already been freed) is skipped for the frame.
fn drawable_meshes(
    primitives: &[ClippedPrimitive],
    texture_exists: impl Fn(TextureId) -> bool,
) -> Vec<(Rect, &egui::Mesh)> {
    primitives
        .iter()
        .filter_map(|ClippedPrimitive { clip_rect, primitive }| match primitive {
            Primitive::Mesh(mesh) if !mesh.vertices.is_empty() && !mesh.indices.is_empty() => {
                if texture_exists(mesh.texture_id) {
                    Some((*clip_rect, mesh))
                } else {
                    warn!(
                        "overlay mesh requires texture {:?} which doesn't exist. skipping...",
                        mesh.texture_id
                    );
                    None
                }
            }
            // we don't need to support Primitive::Callback
            _ => None,
        })
        .collect()
}

/// Doubles `capacity` until it fits `required`
fn grown_capacity(required: vk::DeviceSize, capacity: vk::DeviceSize) -> vk::DeviceSize {
    let mut capacity = capacity.max(1);
    while capacity < required {
        capacity *= 2;
    }
    capacity
}

/// Srgba texel bytes of an egui image
fn egui_image_rgba(image: &egui::ImageData) -> Vec<u8> {
    match image {
        egui::ImageData::Color(image) => {
            if image.width() * image.height() != image.pixels.len() {
                warn!("mismatch between overlay color texture size and texel count");
            }
            image
                .pixels
                .iter()
                .flat_map(|color| color.to_array())
                .collect()
        }
        egui::ImageData::Font(image) => {
            if image.width() * image.height() != image.pixels.len() {
                warn!("mismatch between overlay font texture size and texel count");
            }
            image
                .srgba_pixels(None)
                .flat_map(|color| color.to_array())
                .collect()
        }
    }
}

fn buffer_image_copy([x, y]: [i32; 2], [width, height]: [u32; 2]) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        image_subresource: default_subresource_layers(vk::ImageAspectFlags::COLOR),
        image_offset: vk::Offset3D { x, y, z: 0 },
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
    }
}

fn create_texture_image(
    memory_manager: &MemoryManager,
    [width, height]: [u32; 2],
) -> anyhow::Result<Arc<ImageView<Image>>> {
    let image_properties = ImageProperties {
        format: TEXTURE_FORMAT,
        dimensions: ImageDimensions::new_2d(width, height),
        usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let allocation_info = allocation_info_from_flags(
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::MemoryPropertyFlags::empty(),
    );
    let image = Arc::new(
        Image::new(
            memory_manager.memory_allocator().clone(),
            image_properties.clone(),
            allocation_info,
        )
        .context("creating image for new overlay texture")?,
    );

    let image_view_properties = ImageViewProperties::from_image_properties_default(&image_properties);
    let image_view = ImageView::new(image, image_view_properties)
        .context("creating image view for new overlay texture")?;
    Ok(Arc::new(image_view))
}

/// Transitions to `TRANSFER_DST_OPTIMAL`, copies `staging_buffer` in, then transitions to
/// `SHADER_READ_ONLY_OPTIMAL` for the overlay fragment shader.
fn record_texture_upload(
    device: &Device,
    command_buffer: &CommandBuffer,
    image_view: &ImageView<Image>,
    staging_buffer: &Buffer,
    copy_region: vk::BufferImageCopy,
    old_layout: vk::ImageLayout,
) {
    let (src_stage, src_access) = if old_layout == vk::ImageLayout::UNDEFINED {
        (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty())
    } else {
        (
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
        )
    };

    let to_transfer_barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(old_layout)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .image(image_view.image().handle())
        .subresource_range(image_view.properties().subresource_range)
        .build();

    let to_shader_read_barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .image(image_view.image().handle())
        .subresource_range(image_view.properties().subresource_range)
        .build();

    unsafe {
        let device_ash = device.inner();
        let command_buffer_handle = command_buffer.handle();

        device_ash.cmd_pipeline_barrier(
            command_buffer_handle,
            src_stage,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer_barrier],
        );

        device_ash.cmd_copy_buffer_to_image(
            command_buffer_handle,
            staging_buffer.handle(),
            image_view.image().handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy_region],
        );

        device_ash.cmd_pipeline_barrier(
            command_buffer_handle,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader_read_barrier],
        );
    }
}

fn write_texture_desc_set(desc_set: &DescriptorSet, image_view: &ImageView<Image>, sampler: &Sampler) {
    let texture_info = [vk::DescriptorImageInfo {
        image_view: image_view.handle(),
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        sampler: sampler.handle(),
    }];

    let descriptor_writes = [vk::WriteDescriptorSet::builder()
        .dst_set(desc_set.handle())
        .dst_binding(descriptor::BINDING_TEXTURE)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&texture_info)
        .build()];

    unsafe {
        desc_set
            .device()
            .inner()
            .update_descriptor_sets(&descriptor_writes, &[]);
    }
}

fn create_descriptor_pool(device: Arc<Device>) -> anyhow::Result<Arc<DescriptorPool>> {
    let descriptor_pool_props = DescriptorPoolProperties {
        max_sets: MAX_DESC_SETS_PER_POOL,
        pool_sizes: vec![vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MAX_DESC_SETS_PER_POOL,
        }],
        ..Default::default()
    };

    let descriptor_pool = DescriptorPool::new(device, descriptor_pool_props)
        .context("creating overlay descriptor pool")?;
    Ok(Arc::new(descriptor_pool))
}

fn create_texture_sampler(device: Arc<Device>) -> anyhow::Result<Arc<Sampler>> {
    let sampler_props = SamplerProperties {
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        address_mode: [vk::SamplerAddressMode::CLAMP_TO_EDGE; 3],
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        ..Default::default()
    };

    let sampler = Sampler::new(device, sampler_props).context("creating overlay texture sampler")?;
    Ok(Arc::new(sampler))
}

fn create_descriptor_layout(device: Arc<Device>) -> anyhow::Result<Arc<DescriptorSetLayout>> {
    let layout_props =
        DescriptorSetLayoutProperties::new_default(vec![DescriptorSetLayoutBinding {
            binding: descriptor::BINDING_TEXTURE,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        }]);

    let desc_layout = DescriptorSetLayout::new(device, layout_props)
        .context("creating overlay descriptor set layout")?;
    Ok(Arc::new(desc_layout))
}

fn create_pipeline_layout(
    device: Arc<Device>,
    desc_set_layout: Arc<DescriptorSetLayout>,
) -> anyhow::Result<Arc<PipelineLayout>> {
    let push_constant_range = vk::PushConstantRange::builder()
        .stage_flags(vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(mem::size_of::<OverlayPushConstant>() as u32)
        .build();

    let pipeline_layout_props =
        PipelineLayoutProperties::new(vec![desc_set_layout], vec![push_constant_range]);

    let pipeline_layout = PipelineLayout::new(device, pipeline_layout_props)
        .context("creating overlay pipeline layout")?;
    Ok(Arc::new(pipeline_layout))
}

fn create_pipeline(
    pipeline_layout: Arc<PipelineLayout>,
    render_pass: &RenderPass,
) -> anyhow::Result<Arc<GraphicsPipeline>> {
    let (vert_stage, frag_stage) = overlay_shader_stages(pipeline_layout.device())?;

    let dynamic_state =
        DynamicState::new_default(vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);

    // egui outputs premultiplied alpha
    let color_blend_attachment_state = vk::PipelineColorBlendAttachmentState {
        blend_enable: 1,
        src_color_blend_factor: vk::BlendFactor::ONE,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        dst_alpha_blend_factor: vk::BlendFactor::ONE,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };

    let pipeline_properties = GraphicsPipelineProperties {
        subpass_index: render_pass_indices::SUBPASS_OVERLAY as u32,
        dynamic_state,
        color_blend_state: ColorBlendState::new_default(vec![color_blend_attachment_state]),
        vertex_input_state: EguiVertex::vertex_input_state(),
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
    .context("creating overlay pipeline")?;

    Ok(Arc::new(pipeline))
}

/// Caclulates the region of the framebuffer to render a gui element
fn calculate_gui_element_scissor(
    scale_factor: f32,
    framebuffer_dimensions: [f32; 2],
    rect: Rect,
) -> vk::Rect2D {
    let min = egui::Pos2 {
        x: (rect.min.x * scale_factor).clamp(0.0, framebuffer_dimensions[0]),
        y: (rect.min.y * scale_factor).clamp(0.0, framebuffer_dimensions[1]),
    };
    let max = egui::Pos2 {
        x: (rect.max.x * scale_factor).clamp(min.x, framebuffer_dimensions[0]),
        y: (rect.max.y * scale_factor).clamp(min.y, framebuffer_dimensions[1]),
    };
    vk::Rect2D {
        offset: vk::Offset2D {
            x: min.x.round() as i32,
            y: min.y.round() as i32,
        },
        extent: vk::Extent2D {
            width: (max.x.round() - min.x.round()) as u32,
            height: (max.y.round() - min.y.round()) as u32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_is_scaled_and_clamped() {
        let rect = Rect::from_min_max(egui::pos2(-10., 5.), egui::pos2(300., 50.));
        let scissor = calculate_gui_element_scissor(2., [400., 80.], rect);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 10 });
        assert_eq!(
            scissor.extent,
            vk::Extent2D {
                width: 400,
                height: 70
            }
        );
    }

    #[test]
    fn scissor_outside_framebuffer_is_empty() {
        let rect = Rect::from_min_max(egui::pos2(500., 500.), egui::pos2(600., 600.));
        let scissor = calculate_gui_element_scissor(1., [400., 300.], rect);
        assert_eq!(scissor.extent.width, 0);
        assert_eq!(scissor.extent.height, 0);
    }

    fn mesh_primitive(texture_id: TextureId, vertex_count: usize) -> ClippedPrimitive {
        let mut mesh = egui::Mesh::with_texture(texture_id);
        for _ in 0..vertex_count {
            mesh.colored_vertex(egui::pos2(0., 0.), egui::Color32::WHITE);
        }
        if vertex_count > 0 {
            mesh.add_triangle(0, 0, 0);
        }
        ClippedPrimitive {
            clip_rect: Rect::EVERYTHING,
            primitive: Primitive::Mesh(mesh),
        }
    }

    #[test]
    fn meshes_with_missing_textures_are_skipped() {
        let font = TextureId::Managed(0);
        let freed = TextureId::Managed(3);
        let primitives = [
            mesh_primitive(font, 3),
            mesh_primitive(freed, 3),
            mesh_primitive(font, 0),
            mesh_primitive(TextureId::User(1), 1),
        ];

        let meshes = drawable_meshes(&primitives, |id| id == font || id == TextureId::User(1));
        let texture_ids = meshes.iter().map(|(_, m)| m.texture_id).collect::<Vec<_>>();
        assert_eq!(texture_ids, vec![font, TextureId::User(1)]);
        assert_eq!(meshes[0].1.vertices.len(), 3);
    }

    #[test]
    fn capacity_doubles_until_it_fits() {
        assert_eq!(grown_capacity(100, 64), 128);
        assert_eq!(grown_capacity(64, 64), 64);
        assert_eq!(grown_capacity(1000, 64), 1024);
        assert_eq!(grown_capacity(3, 0), 4);
    }

    #[test]
    fn color_image_bytes() {
        let image = egui::ColorImage::new([2, 1], egui::Color32::from_rgb(10, 20, 30));
        let bytes = egui_image_rgba(&image.into());
        assert_eq!(bytes, vec![10, 20, 30, 255, 10, 20, 30, 255]);
    }
}
