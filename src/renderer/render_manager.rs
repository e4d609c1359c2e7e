use super::{
    config_renderer::{
        INVALID_PROPERTIES_SLEEP, LIGHT_DIRECTION, MAX_FRAMES_IN_FLIGHT, TEXTURE_FORMAT,
        TIMEOUT_NANOSECS,
    },
    memory::{AllocationError, MemoryManager},
    offscreen::OffscreenTargets,
    overlay_pass::OverlayPass,
    queue_families::QueueFamilyIndices,
    scene_pass::ScenePass,
    screenshot,
    shader_interfaces::uniform_buffers::SceneUniformBuffer,
    surface_properties::SurfaceProperties,
    vulkan_init::{
        choose_physical_device_and_queue_families, create_command_pool, create_debug_callback,
        create_depth_buffer, create_device_and_queues, create_entry, create_instance,
        create_overlay_framebuffers, create_overlay_render_pass, create_render_command_buffers,
        create_scene_framebuffers, create_scene_render_pass, create_swapchain,
        create_swapchain_image_views, log_physical_device_details,
        min_uniform_buffer_offset_alignment, scene_clear_values,
    },
};
use crate::{
    scene::{mesh::MaterialTextures, object::Object, ImageData, Scene},
    user_interface::camera::Camera,
};
use anyhow::Context;
use ash::vk;
use bort_vk::{
    default_subresource_layers, CommandBuffer, CommandPool, DebugCallback, Device, Fence,
    Framebuffer, Image, ImageAccess, ImageDimensions, ImageView, ImageViewAccess, Instance,
    PhysicalDevice, Queue, RenderPass, Semaphore, Surface, Swapchain, SwapchainImage,
};
use egui::{ClippedPrimitive, TexturesDelta};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::{mem, path::PathBuf, sync::Arc, thread};
use winit::window::Window;

/// Owns every vulkan object. Fields are declared in reverse creation order so they drop in
/// reverse creation order.
pub struct RenderManager {
    // sync
    image_available_semaphores: Vec<Semaphore>,
    render_finished_semaphores: Vec<Semaphore>,
    in_flight_fences: Vec<Fence>,

    overlay_pass: OverlayPass,
    scene_pass: ScenePass,

    render_command_buffers: Vec<Arc<CommandBuffer>>,
    command_pool: Arc<CommandPool>,

    scene_render_pass: Arc<RenderPass>,
    overlay_render_pass: Arc<RenderPass>,

    swapchain_targets: Option<SwapchainTargets>,
    offscreen_targets: OffscreenTargets,
    surface_properties: SurfaceProperties,

    memory_manager: MemoryManager,

    graphics_queue: Arc<Queue>,
    present_queue: Arc<Queue>,
    queue_family_indices: QueueFamilyIndices,
    device: Arc<Device>,
    physical_device: Arc<PhysicalDevice>,
    surface: Arc<Surface>,
    _debug_callback: Option<Arc<DebugCallback>>,
    _instance: Arc<Instance>,
    _entry: Arc<ash::Entry>,

    window: Arc<Window>,

    // frame state
    frame_index: usize,
    recreate_pending: bool,
    camera: Camera,
    objects: Vec<Object>,
    /// Texture id of each scene image, `None` if it wasn't uploaded
    image_textures: Vec<Option<u32>>,
    pending_textures_delta: Vec<TexturesDelta>,
    screenshot_request: Option<PathBuf>,
}

/// Everything sized to the swapchain images. Recreated on resize.
struct SwapchainTargets {
    overlay_framebuffers: Vec<Arc<Framebuffer>>,
    scene_framebuffers: Vec<Arc<Framebuffer>>,
    depth_buffer: Arc<ImageView<Image>>,
    swapchain_image_views: Vec<Arc<ImageView<SwapchainImage>>>,
    swapchain: Arc<Swapchain>,
}

// Public functions

impl RenderManager {
    pub fn new(window: Arc<Window>, scale_factor: f32, camera: Camera) -> anyhow::Result<Self> {
        debug!("initializing vulkan instance...");
        let entry = create_entry()?;
        let instance = create_instance(entry.clone(), &window)?;

        let debug_callback = create_debug_callback(&entry, instance.clone())?;

        let surface = Arc::new(
            Surface::new(
                &entry,
                instance.clone(),
                window.raw_display_handle(),
                window.raw_window_handle(),
            )
            .context("creating vulkan surface")?,
        );

        debug!("selecting physical device...");
        let chosen = choose_physical_device_and_queue_families(instance.clone(), &surface)?;
        let physical_device = Arc::new(chosen.physical_device);
        let queue_family_indices = chosen.queue_family_indices;
        log_physical_device_details(&physical_device, &surface);

        let device_and_queues = create_device_and_queues(
            physical_device.clone(),
            debug_callback.clone(),
            queue_family_indices,
        )?;
        let device = device_and_queues.device;
        let graphics_queue = device_and_queues.graphics_queue;
        let present_queue = device_and_queues.present_queue;

        let mut memory_manager =
            MemoryManager::new(device.clone(), min_uniform_buffer_offset_alignment(&device))?;

        let surface_properties =
            SurfaceProperties::query(&physical_device, &surface, window_extent(&window))?;
        debug!("surface properties: {:?}", surface_properties);

        let swapchain_format = surface_properties.format.format;
        let overlay_render_pass = create_overlay_render_pass(device.clone(), swapchain_format)?;
        let scene_render_pass = create_scene_render_pass(
            device.clone(),
            swapchain_format,
            surface_properties.depth_format,
        )?;

        let offscreen_targets =
            OffscreenTargets::new(memory_manager.memory_allocator().clone(), &surface_properties)?;
        let swapchain_targets = SwapchainTargets::new(
            &device,
            &surface,
            &memory_manager,
            &surface_properties,
            queue_family_indices,
            &offscreen_targets,
            &scene_render_pass,
            &overlay_render_pass,
        )?;

        debug!("creating scene pipeline...");
        let mut scene_pass = ScenePass::new(device.clone(), &memory_manager, &scene_render_pass)?;

        let command_pool = create_command_pool(device.clone(), &graphics_queue)?;
        let render_command_buffers =
            create_render_command_buffers(command_pool.clone(), MAX_FRAMES_IN_FLIGHT as u32)?;

        let fallback_texture_id = create_fallback_texture(
            &device,
            &graphics_queue,
            &command_pool,
            &mut memory_manager,
        )?;
        scene_pass.set_fallback_texture(fallback_texture_id);

        debug!("creating overlay pipeline...");
        let overlay_pass = OverlayPass::new(device.clone(), &overlay_render_pass, scale_factor)?;

        let (image_available_semaphores, render_finished_semaphores, in_flight_fences) =
            create_sync_objects(&device)?;

        info!("renderer initialized");

        Ok(Self {
            image_available_semaphores,
            render_finished_semaphores,
            in_flight_fences,

            overlay_pass,
            scene_pass,

            render_command_buffers,
            command_pool,

            scene_render_pass,
            overlay_render_pass,

            swapchain_targets: Some(swapchain_targets),
            offscreen_targets,
            surface_properties,

            memory_manager,

            graphics_queue,
            present_queue,
            queue_family_indices,
            device,
            physical_device,
            surface,
            _debug_callback: debug_callback,
            _instance: instance,
            _entry: entry,

            window,

            frame_index: 0,
            recreate_pending: false,
            camera,
            objects: Vec::new(),
            image_textures: Vec::new(),
            pending_textures_delta: Vec::new(),
            screenshot_request: None,
        })
    }

    /// Replaces the loaded scene. Waits for the device to idle. On failure nothing of the new
    /// scene stays allocated.
    pub fn load_scene(&mut self, scene: Scene) -> anyhow::Result<()> {
        self.wait_idle()?;
        self.release_scene()?;

        let Scene { mut objects, images } = scene;
        let reference_counts = image_reference_counts(&objects, images.len());
        self.image_textures = upload_scene_images(
            &self.device,
            &self.graphics_queue,
            &self.command_pool,
            &mut self.memory_manager,
            &images,
            &reference_counts,
        )?;

        // from here on release_scene frees whatever has been allocated
        let allocate_res = self.memory_manager.allocate_models_buffer(&mut objects);
        self.objects = objects;
        let upload_res = allocate_res.and_then(|_| {
            self.scene_pass.write_descriptor_sets(
                &self.objects,
                &self.image_textures,
                &self.memory_manager,
            )
        });
        if let Err(e) = upload_res {
            if let Err(release_e) = self.release_scene() {
                warn!("failed to release partially loaded scene: {}", release_e);
            }
            return Err(e);
        }

        info!(
            "loaded scene with {} objects and {} textures",
            self.objects.len(),
            self.image_textures.iter().flatten().count()
        );
        Ok(())
    }

    pub fn update_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Surface properties will be re-queried next frame
    pub fn set_window_resized(&mut self) {
        self.recreate_pending = true;
    }

    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.overlay_pass.set_scale_factor(scale_factor);
    }

    pub fn update_overlay_primitives(&mut self, primitives: Vec<ClippedPrimitive>) {
        self.overlay_pass.set_primitives(primitives);
    }

    /// Applied when the next frame is recorded
    pub fn update_overlay_textures(&mut self, mut textures_delta: Vec<TexturesDelta>) {
        self.pending_textures_delta.append(&mut textures_delta);
    }

    /// The next rendered frame is written to `path` as a png
    pub fn request_screenshot(&mut self, path: PathBuf) {
        self.screenshot_request = Some(path);
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn draw_frame(&mut self) -> anyhow::Result<()> {
        if !self.surface_properties.is_valid() {
            // e.g. minimized window
            self.wait_idle()?;
            self.surface_properties = self.query_surface_properties()?;
            if !self.surface_properties.is_valid() {
                thread::sleep(INVALID_PROPERTIES_SLEEP);
                return Ok(());
            }
            self.recreate_pending = true;
        }

        if self.recreate_pending {
            return self.recreate_swapchain();
        }

        let frame_index = self.frame_index;
        self.in_flight_fences[frame_index]
            .wait(TIMEOUT_NANOSECS)
            .context("waiting for frame in flight fence")?;

        let swapchain = self
            .swapchain_targets
            .as_ref()
            .context("swapchain targets missing")?
            .swapchain
            .clone();

        let acquire_result = unsafe {
            swapchain.swapchain_loader().acquire_next_image(
                swapchain.handle(),
                TIMEOUT_NANOSECS,
                self.image_available_semaphores[frame_index].handle(),
                vk::Fence::null(),
            )
        };
        let image_index = match acquire_result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.recreate_pending = true;
                }
                image_index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("swapchain out of date on acquire");
                self.recreate_pending = true;
                return Ok(());
            }
            Err(e) => return Err(e).context("acquiring swapchain image"),
        };

        self.in_flight_fences[frame_index]
            .reset()
            .context("resetting frame in flight fence")?;

        self.overlay_pass.begin_frame(frame_index);
        self.update_uniforms(frame_index)?;
        self.record_frame_commands(frame_index, image_index)?;

        let command_buffer_handles = [self.render_command_buffers[frame_index].handle()];
        let wait_semaphores = [self.image_available_semaphores[frame_index].handle()];
        let wait_stages =
            [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [self.render_finished_semaphores[frame_index].handle()];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffer_handles)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);
        self.graphics_queue
            .submit(
                &[submit_info.build()],
                Some(self.in_flight_fences[frame_index].handle()),
            )
            .context("submitting frame commands")?;

        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let present_result = unsafe {
            swapchain
                .swapchain_loader()
                .queue_present(self.present_queue.handle(), &present_info)
        };
        match present_result {
            Ok(false) => (),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("swapchain suboptimal or out of date on present");
                self.recreate_pending = true;
            }
            Err(e) => return Err(e).context("presenting swapchain image"),
        }

        if let Some(path) = self.screenshot_request.take() {
            if let Err(e) = self.save_screenshot(frame_index, &path) {
                error!("failed to save screenshot to {:?}: {:?}", path, e);
            }
        }

        self.frame_index = (frame_index + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(())
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        debug!("dropping render manager...");
        if let Err(e) = self.wait_idle() {
            error!("device wait idle failed during shutdown: {}", e);
        }
        self.scene_pass.clear_descriptor_sets();
        self.objects.clear();
        self.image_textures.clear();
        self.memory_manager.release_all();
    }
}

// Private functions

impl RenderManager {
    fn wait_idle(&self) -> anyhow::Result<()> {
        unsafe { self.device.inner().device_wait_idle() }.context("waiting for device idle")
    }

    /// Re-queries the surface, keeping the format the render passes were created with
    fn query_surface_properties(&self) -> anyhow::Result<SurfaceProperties> {
        let queried = SurfaceProperties::query(
            &self.physical_device,
            &self.surface,
            window_extent(&self.window),
        )?;
        Ok(queried.keeping_format_of(&self.surface_properties))
    }

    fn recreate_swapchain(&mut self) -> anyhow::Result<()> {
        self.wait_idle()?;

        let surface_properties = self.query_surface_properties()?;
        if !surface_properties.is_valid() {
            self.surface_properties = surface_properties;
            return Ok(());
        }
        debug!(
            "recreating swapchain with extent {:?}",
            surface_properties.extent
        );

        // the old swapchain must be destroyed before its surface can be reused
        self.swapchain_targets = None;

        self.offscreen_targets.recreate(&surface_properties)?;
        let swapchain_targets = SwapchainTargets::new(
            &self.device,
            &self.surface,
            &self.memory_manager,
            &surface_properties,
            self.queue_family_indices,
            &self.offscreen_targets,
            &self.scene_render_pass,
            &self.overlay_render_pass,
        )?;

        self.swapchain_targets = Some(swapchain_targets);
        self.surface_properties = surface_properties;
        self.recreate_pending = false;
        Ok(())
    }

    fn update_uniforms(&mut self, frame_index: usize) -> anyhow::Result<()> {
        let scene_ubo = SceneUniformBuffer::new(
            self.camera.view_matrix().as_mat4(),
            self.camera.projection_matrix().as_mat4(),
            self.camera.position().as_vec3(),
            LIGHT_DIRECTION.into(),
        );
        self.scene_pass.update_scene_uniforms(frame_index, scene_ubo)
    }

    fn record_frame_commands(&mut self, frame_index: usize, image_index: u32) -> anyhow::Result<()> {
        let command_buffer = self.render_command_buffers[frame_index].clone();
        let command_buffer_handle = command_buffer.handle();
        let swapchain_targets = self
            .swapchain_targets
            .as_ref()
            .context("swapchain targets missing")?;
        let offscreen_view = self
            .offscreen_targets
            .image_view(frame_index)
            .context("indexing offscreen target")?
            .clone();
        let swapchain_image_view = swapchain_targets
            .swapchain_image_views
            .get(image_index as usize)
            .context("indexing swapchain image view")?
            .clone();
        let scene_framebuffer = swapchain_targets.scene_framebuffers[frame_index].clone();
        let overlay_framebuffer = swapchain_targets
            .overlay_framebuffers
            .get(image_index as usize)
            .context("indexing overlay framebuffer")?
            .clone();

        let extent = self.surface_properties.extent;
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport = vk::Viewport {
            x: 0.,
            y: 0.,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.,
            max_depth: 1.,
        };

        let device_ash = self.device.inner();
        unsafe {
            device_ash
                .reset_command_buffer(command_buffer_handle, vk::CommandBufferResetFlags::empty())
                .context("resetting frame command buffer")?;
        }
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        command_buffer
            .begin(&begin_info)
            .context("beginning frame command buffer")?;

        let textures_delta = mem::take(&mut self.pending_textures_delta);
        self.overlay_pass.update_textures(
            &command_buffer,
            frame_index,
            textures_delta,
            &self.memory_manager,
        )?;

        // scene pass into the offscreen target

        let scene_clear_values = scene_clear_values();
        let scene_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.scene_render_pass.handle())
            .framebuffer(scene_framebuffer.handle())
            .render_area(render_area)
            .clear_values(&scene_clear_values);
        unsafe {
            device_ash.cmd_begin_render_pass(
                command_buffer_handle,
                &scene_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }
        self.scene_pass.record_commands(
            &command_buffer,
            frame_index,
            viewport,
            render_area,
            &self.objects,
            &self.memory_manager,
        )?;
        unsafe {
            device_ash.cmd_end_render_pass(command_buffer_handle);
        }

        // blit offscreen target to the swapchain image

        record_blit_to_swapchain(
            &self.device,
            &command_buffer,
            offscreen_view.image().as_ref(),
            &swapchain_image_view,
            extent,
        );

        // overlay on top of the swapchain image

        let overlay_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.overlay_render_pass.handle())
            .framebuffer(overlay_framebuffer.handle())
            .render_area(render_area);
        unsafe {
            device_ash.cmd_begin_render_pass(
                command_buffer_handle,
                &overlay_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }
        self.overlay_pass.record_render_commands(
            &command_buffer,
            frame_index,
            is_srgb(self.surface_properties.format.format),
            [extent.width as f32, extent.height as f32],
            &self.memory_manager,
        )?;
        unsafe {
            device_ash.cmd_end_render_pass(command_buffer_handle);
        }

        command_buffer
            .end()
            .context("ending frame command buffer")?;
        Ok(())
    }

    /// Waits for the frame to finish then reads back its offscreen target
    fn save_screenshot(&self, frame_index: usize, path: &PathBuf) -> anyhow::Result<()> {
        self.in_flight_fences[frame_index]
            .wait(TIMEOUT_NANOSECS)
            .context("waiting for screenshot frame")?;

        let offscreen_view = self
            .offscreen_targets
            .image_view(frame_index)
            .context("indexing offscreen target")?;
        let extent = self.offscreen_targets.extent();
        let rgba = screenshot::capture(
            &self.device,
            &self.graphics_queue,
            &self.command_pool,
            &self.memory_manager,
            offscreen_view.image().as_ref(),
            self.offscreen_targets.format(),
            [extent.width, extent.height],
        )?;
        screenshot::write_png(path, &rgba, extent.width, extent.height)
    }

    /// Releases the current scene's buffers and textures. The device must be idle.
    fn release_scene(&mut self) -> anyhow::Result<()> {
        self.scene_pass.clear_descriptor_sets();

        let objects = mem::take(&mut self.objects);
        let image_textures = mem::take(&mut self.image_textures);
        release_scene_allocations(
            &mut self.memory_manager,
            &objects,
            &image_textures,
            MemoryManager::release_object,
            MemoryManager::release_texture,
        )?;

        if !objects.is_empty() {
            debug!("released scene with {} objects", objects.len());
        }
        Ok(())
    }
}

impl SwapchainTargets {
    #[allow(clippy::too_many_arguments)]
    fn new(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
        memory_manager: &MemoryManager,
        surface_properties: &SurfaceProperties,
        queue_family_indices: QueueFamilyIndices,
        offscreen_targets: &OffscreenTargets,
        scene_render_pass: &Arc<RenderPass>,
        overlay_render_pass: &Arc<RenderPass>,
    ) -> anyhow::Result<Self> {
        let swapchain = create_swapchain(
            device.clone(),
            surface.clone(),
            surface_properties,
            queue_family_indices,
        )?;
        let swapchain_image_views = create_swapchain_image_views(&swapchain)?;

        let [width, height] = surface_properties.width_height();
        let depth_buffer = create_depth_buffer(
            memory_manager.memory_allocator().clone(),
            ImageDimensions::new_2d(width, height),
            surface_properties.depth_format,
        )?;

        let scene_framebuffers = create_scene_framebuffers(
            scene_render_pass,
            offscreen_targets.image_views(),
            &depth_buffer,
        )?;
        let overlay_framebuffers =
            create_overlay_framebuffers(overlay_render_pass, &swapchain_image_views)?;

        Ok(Self {
            overlay_framebuffers,
            scene_framebuffers,
            depth_buffer,
            swapchain_image_views,
            swapchain,
        })
    }
}

// ~~ Helper Functions ~~

fn window_extent(window: &Window) -> [u32; 2] {
    let size = window.inner_size();
    [size.width, size.height]
}

/// egui colors are gamma encoded so need linearizing before being written to an srgb target
fn is_srgb(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_SRGB
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::A8B8G8R8_SRGB_PACK32
            | vk::Format::R8G8B8_SRGB
            | vk::Format::B8G8R8_SRGB
    )
}

/// Each image index referenced by `material`, once
fn distinct_images(material: &MaterialTextures) -> Vec<usize> {
    let mut images = material.slots().into_iter().flatten().collect::<Vec<_>>();
    images.sort_unstable();
    images.dedup();
    images
}

/// Number of objects referencing each scene image
fn image_reference_counts(objects: &[Object], image_count: usize) -> Vec<u32> {
    let mut counts = vec![0; image_count];
    for object in objects {
        for image_index in distinct_images(&object.mesh.material) {
            if let Some(count) = counts.get_mut(image_index) {
                *count += 1;
            } else {
                warn!(
                    "{} references missing image {}",
                    object.name, image_index
                );
            }
        }
    }
    counts
}

/// Byte length of a `width` x `height` rgba8 image, `None` if it doesn't fit in memory
fn rgba8_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|texels| texels.checked_mul(4))
}

/// Uploads each referenced image once with one reference per object using it
fn upload_scene_images(
    device: &Arc<Device>,
    queue: &Queue,
    command_pool: &Arc<CommandPool>,
    memory_manager: &mut MemoryManager,
    images: &[ImageData],
    reference_counts: &[u32],
) -> anyhow::Result<Vec<Option<u32>>> {
    if reference_counts.iter().all(|&c| c == 0) {
        return Ok(vec![None; images.len()]);
    }

    let mut image_textures = Vec::new();
    let submit_res = submit_one_time_commands(device, queue, command_pool, |command_buffer| {
        image_textures = upload_referenced_images(
            memory_manager,
            images,
            reference_counts,
            |memory_manager, image, refs| {
                let texture_id = memory_manager.allocate_texture(
                    command_buffer,
                    &image.rgba,
                    image.width,
                    image.height,
                    TEXTURE_FORMAT,
                )?;
                memory_manager.acquire_texture(texture_id, refs - 1)?;
                Ok(texture_id)
            },
            MemoryManager::release_texture,
        )?;
        Ok(())
    });

    if let Err(e) = submit_res {
        // staging buffers may still be in use if the submission timed out
        if let Err(idle_e) = unsafe { device.inner().device_wait_idle() } {
            warn!("device wait idle failed after texture upload error: {}", idle_e);
        }
        release_uploaded_images(
            memory_manager,
            &image_textures,
            reference_counts,
            MemoryManager::release_texture,
        );
        memory_manager.free_staging_buffers();
        return Err(e);
    }

    memory_manager.free_staging_buffers();
    Ok(image_textures)
}

/// Calls `upload` for each image with a non-zero reference count, expecting a texture id holding
/// that many references. Images with the wrong byte length are skipped. If an upload fails, every
/// texture uploaded so far is released through `release`.
fn upload_referenced_images<S>(
    store: &mut S,
    images: &[ImageData],
    reference_counts: &[u32],
    mut upload: impl FnMut(&mut S, &ImageData, u32) -> anyhow::Result<u32>,
    release: impl Fn(&mut S, u32) -> Result<(), AllocationError>,
) -> anyhow::Result<Vec<Option<u32>>> {
    let mut image_textures = Vec::with_capacity(images.len());
    for (image_index, image) in images.iter().enumerate() {
        let refs = reference_counts.get(image_index).copied().unwrap_or(0);
        if refs == 0 {
            image_textures.push(None);
            continue;
        }
        if rgba8_len(image.width, image.height) != Some(image.rgba.len()) {
            warn!(
                "image {} has {} bytes for {}x{} texels. skipping...",
                image_index,
                image.rgba.len(),
                image.width,
                image.height
            );
            image_textures.push(None);
            continue;
        }

        match upload(store, image, refs) {
            Ok(texture_id) => image_textures.push(Some(texture_id)),
            Err(e) => {
                release_uploaded_images(store, &image_textures, reference_counts, &release);
                return Err(e.context(format!("uploading scene image {}", image_index)));
            }
        }
    }
    Ok(image_textures)
}

/// Drops every reference [`upload_referenced_images`] took
fn release_uploaded_images<S>(
    store: &mut S,
    image_textures: &[Option<u32>],
    reference_counts: &[u32],
    release: impl Fn(&mut S, u32) -> Result<(), AllocationError>,
) {
    for (texture_id, &refs) in image_textures.iter().zip(reference_counts) {
        let Some(texture_id) = *texture_id else {
            continue;
        };
        for _ in 0..refs {
            if let Err(e) = release(store, texture_id) {
                warn!("failed to release texture {}: {}", texture_id, e);
                break;
            }
        }
    }
}

/// Drops the models buffer reference and the texture references held by each object
fn release_scene_allocations<S>(
    store: &mut S,
    objects: &[Object],
    image_textures: &[Option<u32>],
    release_buffer: impl Fn(&mut S, u32) -> Result<(), AllocationError>,
    release_texture: impl Fn(&mut S, u32) -> Result<(), AllocationError>,
) -> Result<(), AllocationError> {
    for object in objects {
        if let Some(buffer_id) = object.buffer_id {
            release_buffer(store, buffer_id)?;
        }
        for image_index in distinct_images(&object.mesh.material) {
            if let Some(Some(texture_id)) = image_textures.get(image_index) {
                release_texture(store, *texture_id)?;
            }
        }
    }
    Ok(())
}

/// 1x1 white texture bound to material slots without an image
fn create_fallback_texture(
    device: &Arc<Device>,
    queue: &Queue,
    command_pool: &Arc<CommandPool>,
    memory_manager: &mut MemoryManager,
) -> anyhow::Result<u32> {
    let texture_id = submit_one_time_commands(device, queue, command_pool, |command_buffer| {
        memory_manager.allocate_texture(command_buffer, &[255; 4], 1, 1, TEXTURE_FORMAT)
    })?;
    memory_manager.free_staging_buffers();
    Ok(texture_id)
}

/// Records commands with `record`, submits them and blocks until they've completed
fn submit_one_time_commands<T>(
    device: &Arc<Device>,
    queue: &Queue,
    command_pool: &Arc<CommandPool>,
    record: impl FnOnce(&CommandBuffer) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let command_buffer = command_pool
        .allocate_command_buffer(vk::CommandBufferLevel::PRIMARY)
        .context("allocating one time command buffer")?;

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    command_buffer
        .begin(&begin_info)
        .context("beginning one time command buffer")?;
    let output = record(&command_buffer)?;
    command_buffer
        .end()
        .context("ending one time command buffer")?;

    let fence = Fence::new_unsignalled(device.clone()).context("creating one time fence")?;
    let command_buffer_handles = [command_buffer.handle()];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffer_handles);
    queue
        .submit(&[submit_info.build()], Some(fence.handle()))
        .context("submitting one time commands")?;
    fence
        .wait(TIMEOUT_NANOSECS)
        .context("waiting for one time commands")?;

    Ok(output)
}

fn record_blit_to_swapchain(
    device: &Device,
    command_buffer: &CommandBuffer,
    source_image: &Image,
    swapchain_image_view: &ImageView<SwapchainImage>,
    extent: vk::Extent2D,
) {
    let swapchain_image_handle = swapchain_image_view.image().handle();
    let subresource_range = swapchain_image_view.properties().subresource_range;

    let to_transfer_dst_barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .image(swapchain_image_handle)
        .subresource_range(subresource_range)
        .build();

    let corner = vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    };
    let blit_region = vk::ImageBlit {
        src_subresource: default_subresource_layers(vk::ImageAspectFlags::COLOR),
        src_offsets: [vk::Offset3D::default(), corner],
        dst_subresource: default_subresource_layers(vk::ImageAspectFlags::COLOR),
        dst_offsets: [vk::Offset3D::default(), corner],
    };

    unsafe {
        let device_ash = device.inner();
        let command_buffer_handle = command_buffer.handle();

        device_ash.cmd_pipeline_barrier(
            command_buffer_handle,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer_dst_barrier],
        );

        device_ash.cmd_blit_image(
            command_buffer_handle,
            source_image.handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            swapchain_image_handle,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit_region],
            vk::Filter::NEAREST,
        );
    }
}

fn create_sync_objects(
    device: &Arc<Device>,
) -> anyhow::Result<(Vec<Semaphore>, Vec<Semaphore>, Vec<Fence>)> {
    let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    let mut render_finished = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    let mut in_flight = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        image_available.push(
            Semaphore::new(device.clone()).context("creating image available semaphore")?,
        );
        render_finished.push(
            Semaphore::new(device.clone()).context("creating render finished semaphore")?,
        );
        in_flight.push(Fence::new_signalled(device.clone()).context("creating in flight fence")?);
    }
    Ok((image_available, render_finished, in_flight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        renderer::memory::AllocationRegistry,
        scene::{mesh::Mesh, object::Transform},
    };

    fn object_with_material(material: MaterialTextures) -> Object {
        Object::new(
            "textured",
            Mesh::new(Vec::new(), Vec::new(), material),
            Transform::IDENTITY,
        )
    }

    #[test]
    fn images_shared_between_slots_count_once_per_object() {
        let a = object_with_material(MaterialTextures {
            albedo: Some(0),
            emissive: Some(0),
            normal: Some(2),
            ..Default::default()
        });
        let b = object_with_material(MaterialTextures {
            albedo: Some(0),
            metallic_roughness: Some(9),
            ..Default::default()
        });
        let c = object_with_material(MaterialTextures::default());

        assert_eq!(image_reference_counts(&[a, b, c], 3), vec![2, 0, 1]);
    }

    #[test]
    fn distinct_images_are_sorted_and_deduplicated() {
        let material = MaterialTextures {
            albedo: Some(3),
            normal: Some(1),
            occlusion: Some(3),
            emissive: None,
            metallic_roughness: Some(1),
        };
        assert_eq!(distinct_images(&material), vec![1, 3]);
    }

    fn rgba_image(width: u32, height: u32) -> ImageData {
        ImageData {
            width,
            height,
            rgba: vec![0; (width * height * 4) as usize],
        }
    }

    fn release_from(registry: &mut AllocationRegistry<usize>, id: u32) -> Result<(), AllocationError> {
        registry.release(id).map(|_| ())
    }

    #[test]
    fn rgba8_len_does_not_overflow() {
        assert_eq!(rgba8_len(2, 3), Some(24));
        assert_eq!(rgba8_len(0, 7), Some(0));
        assert_eq!(rgba8_len(u32::MAX, u32::MAX), None);
        // wraps to 0 when multiplied as u32
        assert_eq!(rgba8_len(65536, 65536), 65536usize.checked_mul(65536 * 4));
    }

    #[test]
    fn referenced_images_are_uploaded_once_with_their_reference_counts() {
        let mut mismatched = rgba_image(2, 2);
        mismatched.rgba.pop();
        let images = [rgba_image(1, 1), rgba_image(2, 2), rgba_image(1, 1), mismatched];
        let mut registry = AllocationRegistry::new();

        let image_textures = upload_referenced_images(
            &mut registry,
            &images,
            &[2, 0, 1, 3],
            |registry, image, refs| Ok(registry.insert(image.rgba.len(), refs)),
            release_from,
        )
        .unwrap();

        assert_eq!(image_textures, vec![Some(0), None, Some(1), None]);
        assert_eq!(registry.refs(0), Some(2));
        assert_eq!(registry.refs(1), Some(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn failed_image_upload_releases_earlier_textures() {
        let images = [rgba_image(1, 1), rgba_image(1, 1), rgba_image(1, 1)];
        let mut registry = AllocationRegistry::new();
        let mut uploads = 0;

        let res = upload_referenced_images(
            &mut registry,
            &images,
            &[3, 1, 2],
            |registry, image, refs| {
                uploads += 1;
                if uploads == 3 {
                    anyhow::bail!("out of device memory");
                }
                Ok(registry.insert(image.rgba.len(), refs))
            },
            release_from,
        );

        assert!(res.is_err());
        assert_eq!(uploads, 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn releasing_a_partially_loaded_scene_frees_everything() {
        let a = object_with_material(MaterialTextures {
            albedo: Some(0),
            normal: Some(1),
            ..Default::default()
        });
        let b = object_with_material(MaterialTextures {
            albedo: Some(0),
            ..Default::default()
        });
        let images = [rgba_image(1, 1), rgba_image(1, 1)];
        let reference_counts = image_reference_counts(&[a.clone(), b.clone()], images.len());
        let mut textures = AllocationRegistry::new();
        let image_textures = upload_referenced_images(
            &mut textures,
            &images,
            &reference_counts,
            |registry, image, refs| Ok(registry.insert(image.rgba.len(), refs)),
            release_from,
        )
        .unwrap();

        // models buffer never registered, e.g. the allocation failed
        let mut store = (AllocationRegistry::<usize>::new(), textures);
        release_scene_allocations(
            &mut store,
            &[a.clone(), b.clone()],
            &image_textures,
            |store, id| release_from(&mut store.0, id),
            |store, id| release_from(&mut store.1, id),
        )
        .unwrap();
        assert!(store.1.is_empty());

        // models buffer registered with one reference per object
        let mut objects = [a, b];
        let buffer_id = store.0.insert(0, objects.len() as u32);
        for object in &mut objects {
            object.buffer_id = Some(buffer_id);
        }
        let image_textures = upload_referenced_images(
            &mut store.1,
            &images,
            &reference_counts,
            |registry, image, refs| Ok(registry.insert(image.rgba.len(), refs)),
            release_from,
        )
        .unwrap();
        release_scene_allocations(
            &mut store,
            &objects,
            &image_textures,
            |store, id| release_from(&mut store.0, id),
            |store, id| release_from(&mut store.1, id),
        )
        .unwrap();
        assert!(store.0.is_empty());
        assert!(store.1.is_empty());
    }

    #[test]
    fn srgb_formats() {
        assert!(is_srgb(vk::Format::B8G8R8A8_SRGB));
        assert!(is_srgb(vk::Format::R8G8B8A8_SRGB));
        assert!(!is_srgb(vk::Format::B8G8R8A8_UNORM));
        assert!(!is_srgb(vk::Format::R16G16B16A16_SFLOAT));
    }
}
