use super::{
    config_renderer::{CLEAR_COLOR, ENABLE_VULKAN_VALIDATION, MAX_VULKAN_VER, MIN_VULKAN_VER},
    queue_families::{select_queue_families, QueueFamilyIndices},
    surface_properties::{choose_composite_alpha, choose_pre_transform, SurfaceProperties},
};
use anyhow::Context;
use ash::vk;
use bort_vk::{
    CommandBuffer, CommandPool, CommandPoolProperties, DebugCallback, Device, Framebuffer,
    FramebufferProperties, Image, ImageAccess, ImageDimensions, ImageView, ImageViewAccess,
    ImageViewProperties, Instance, MemoryAllocator, PhysicalDevice, Queue, RenderPass, Subpass,
    Surface, Swapchain, SwapchainImage, SwapchainProperties,
};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use raw_window_handle::HasRawDisplayHandle;
use std::{ffi::CStr, sync::Arc};
use winit::window::Window;

const VALIDATION_LAYER_NAME: &str = "VK_LAYER_KHRONOS_validation";

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn create_entry() -> anyhow::Result<Arc<ash::Entry>> {
    let entry = unsafe { ash::Entry::load() }
        .context("loading vulkan dynamic library. please install vulkan on your system...")?;
    Ok(Arc::new(entry))
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn create_entry() -> anyhow::Result<Arc<ash::Entry>> {
    let entry = ash_molten::load();
    Ok(Arc::new(entry))
}

pub fn required_device_extensions() -> [&'static str; 2] {
    ["VK_KHR_swapchain", "VK_KHR_synchronization2"]
}

/// Make sure to update `required_features_1_0` too!
pub fn supports_required_features_1_0(supported_features: vk::PhysicalDeviceFeatures) -> bool {
    supported_features.sampler_anisotropy == vk::TRUE
}

/// Make sure to update `supports_required_features_1_0` too!
pub fn required_features_1_0() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    }
}

// ~~ Instance ~~

pub fn create_instance(entry: Arc<ash::Entry>, window: &Window) -> anyhow::Result<Arc<Instance>> {
    let layer_properties = entry
        .enumerate_instance_layer_properties()
        .context("enumerating instance layer properties")?;
    let available_layers = layer_properties
        .iter()
        .map(|layer_prop| {
            unsafe { CStr::from_ptr(layer_prop.layer_name.as_ptr()) }
                .to_str()
                .context("decoding installed layer names")
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    debug!("available instance layers: {:?}", available_layers);

    let extension_properties = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerating instance extension properties")?;
    debug!(
        "available instance extensions: {:?}",
        extension_properties
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_string_lossy())
            .collect::<Vec<_>>()
    );

    let mut layer_names = Vec::<&str>::new();
    let mut extension_names = Vec::<&str>::new();

    if ENABLE_VULKAN_VALIDATION {
        if available_layers.contains(&VALIDATION_LAYER_NAME) {
            debug!("enabling vulkan layer: {}", VALIDATION_LAYER_NAME);
            layer_names.push(VALIDATION_LAYER_NAME);
        } else {
            warn!(
                "validation requested but {} is not installed",
                VALIDATION_LAYER_NAME
            );
        }

        debug!("enabling instance extension: VK_EXT_debug_utils");
        extension_names.push("VK_EXT_debug_utils");
    }

    let instance = Arc::new(
        Instance::new(
            entry,
            MAX_VULKAN_VER,
            window.raw_display_handle(),
            layer_names,
            extension_names,
        )
        .context("creating vulkan instance")?,
    );

    info!(
        "created vulkan instance. max api version = {:?}",
        instance.max_api_version()
    );

    Ok(instance)
}

pub fn create_debug_callback(
    entry: &ash::Entry,
    instance: Arc<Instance>,
) -> anyhow::Result<Option<Arc<DebugCallback>>> {
    if !ENABLE_VULKAN_VALIDATION {
        return Ok(None);
    }
    let debug_callback = DebugCallback::new(
        entry,
        instance,
        super::debug_callback::log_vulkan_debug_callback,
    )
    .context("creating vulkan debug callback")?;
    Ok(Some(Arc::new(debug_callback)))
}

// ~~ Physical Device ~~

pub struct ChoosePhysicalDeviceReturn {
    pub physical_device: PhysicalDevice,
    pub queue_family_indices: QueueFamilyIndices,
}

/// Higher is preferred
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

pub fn choose_physical_device_and_queue_families(
    instance: Arc<Instance>,
    surface: &Surface,
) -> anyhow::Result<ChoosePhysicalDeviceReturn> {
    let p_device_handles = unsafe { instance.inner().enumerate_physical_devices() }
        .context("enumerating physical devices")?;
    let p_devices: Vec<PhysicalDevice> = p_device_handles
        .iter()
        .map(|&handle| PhysicalDevice::new(instance.clone(), handle))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("available vulkan physical devices:");
    for pd in &p_devices {
        debug!("\t{} ({:?})", pd.name(), pd.properties().device_type);
    }

    let required_extensions = required_device_extensions();
    let required_features = required_features_1_0();
    trace!(
        "required physical device extensions = {:?}",
        required_extensions
    );

    let chosen_device = p_devices
        .into_iter()
        .filter(|p| p.supports_api_ver(MIN_VULKAN_VER))
        .filter(|p| p.supports_extensions(required_extensions.into_iter()))
        .filter(|p| {
            let supported_features =
                unsafe { instance.inner().get_physical_device_features(p.handle()) };
            let supported = supports_required_features_1_0(supported_features);
            if !supported {
                trace!(
                    "physical device {} doesn't support required features",
                    p.name()
                );
            }
            supported
        })
        .filter_map(|physical_device| {
            let queue_family_indices =
                select_queue_families(&physical_device.queue_family_properties()[..], |index| {
                    surface
                        .get_physical_device_surface_support(&physical_device, index)
                        .unwrap_or(false)
                });
            match queue_family_indices {
                Some(queue_family_indices) => Some(ChoosePhysicalDeviceReturn {
                    physical_device,
                    queue_family_indices,
                }),
                None => {
                    debug!(
                        "no suitable queue families found for physical device {}",
                        physical_device.name()
                    );
                    None
                }
            }
        })
        .max_by_key(|ChoosePhysicalDeviceReturn { physical_device, .. }| {
            device_type_rank(physical_device.properties().device_type)
        });

    chosen_device.with_context(|| {
        format!(
            "could not find a suitable vulkan implimentation (device and driver). requirements:\n
            \t- must contain queue families supporting graphics and surface operations\n
            \t- must minimum api version: {:?}\n
            \t- must support device extensions: {:?}\n
            \t- must support device features: {:?}",
            MIN_VULKAN_VER, required_extensions, required_features
        )
    })
}

/// Debug listings of the chosen device's extensions and surface support
pub fn log_physical_device_details(physical_device: &PhysicalDevice, surface: &Surface) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }

    match unsafe {
        physical_device
            .instance()
            .inner()
            .enumerate_device_extension_properties(physical_device.handle())
    } {
        Ok(extensions) => debug!(
            "device extensions: {:?}",
            extensions
                .iter()
                .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy())
                .collect::<Vec<_>>()
        ),
        Err(e) => warn!("failed to enumerate device extensions: {}", e),
    }

    if let Ok(capabilities) = surface.get_physical_device_surface_capabilities(physical_device) {
        debug!("surface capabilities: {:?}", capabilities);
    }
    if let Ok(formats) = surface.get_physical_device_surface_formats(physical_device) {
        debug!("surface formats: {:?}", formats);
    }
    if let Ok(present_modes) = surface.get_physical_device_surface_present_modes(physical_device)
    {
        debug!("surface present modes: {:?}", present_modes);
    }
}

// ~~ Device ~~

pub struct CreateDeviceAndQueuesReturn {
    pub device: Arc<Device>,
    pub graphics_queue: Arc<Queue>,
    pub present_queue: Arc<Queue>,
}

pub fn create_device_and_queues(
    physical_device: Arc<PhysicalDevice>,
    debug_callback: Option<Arc<DebugCallback>>,
    queue_family_indices: QueueFamilyIndices,
) -> anyhow::Result<CreateDeviceAndQueuesReturn> {
    let single_queue_priority = [1.0];

    let unique_families = queue_family_indices.unique();
    let queue_infos = unique_families
        .iter()
        .map(|&family_index| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family_index)
                .queue_priorities(&single_queue_priority)
                .build()
        })
        .collect::<Vec<_>>();

    let features_1_0 = required_features_1_0();
    let features_1_1 = vk::PhysicalDeviceVulkan11Features::default();
    let features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
    let features_1_3 = vk::PhysicalDeviceVulkan13Features::default();

    let extension_names: Vec<String> = required_device_extensions()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let synchronization_feature =
        vk::PhysicalDeviceSynchronization2Features::builder().synchronization2(true);

    let device_raw = unsafe {
        Device::new_with_p_next_chain(
            physical_device,
            queue_infos.as_slice(),
            features_1_0,
            features_1_1,
            features_1_2,
            features_1_3,
            extension_names,
            [],
            debug_callback,
            vec![synchronization_feature],
        )?
    };
    let device = Arc::new(device_raw);

    // one queue per unique family, shared between roles on the same family. uploads are small and
    // one-off so they go through the graphics queue and the transfer family queue goes unused.
    let queues = unique_families
        .iter()
        .map(|&family_index| {
            let queue = Queue::new(device.clone(), family_index, 0)
                .with_context(|| format!("creating queue for family {}", family_index))?;
            Ok((family_index, Arc::new(queue)))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let queue_for_family = |family_index: u32| {
        queues
            .iter()
            .find(|(i, _)| *i == family_index)
            .map(|(_, q)| q.clone())
            .with_context(|| format!("no queue created for family {}", family_index))
    };

    let graphics_queue = queue_for_family(queue_family_indices.graphics)?;
    let present_queue = queue_for_family(queue_family_indices.present)?;
    debug!(
        "created queues. graphics family = {}, transfer family = {}, present family = {}",
        queue_family_indices.graphics, queue_family_indices.transfer, queue_family_indices.present
    );

    Ok(CreateDeviceAndQueuesReturn {
        device,
        graphics_queue,
        present_queue,
    })
}

pub fn min_uniform_buffer_offset_alignment(device: &Device) -> vk::DeviceSize {
    device
        .physical_device()
        .properties()
        .limits
        .min_uniform_buffer_offset_alignment
}

pub fn create_command_pool(device: Arc<Device>, queue: &Queue) -> anyhow::Result<Arc<CommandPool>> {
    let command_pool_props = CommandPoolProperties {
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        queue_family_index: queue.family_index(),
    };
    let command_pool = CommandPool::new(device, command_pool_props)
        .context("creating render manager command pool")?;
    Ok(Arc::new(command_pool))
}

pub fn create_render_command_buffers(
    render_command_pool: Arc<CommandPool>,
    count: u32,
) -> anyhow::Result<Vec<Arc<CommandBuffer>>> {
    let command_buffers = render_command_pool
        .allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, count)
        .context("allocating per-frame command buffers")?;

    let command_buffer_arcs = command_buffers
        .into_iter()
        .map(|cb| Arc::new(cb))
        .collect::<Vec<_>>();
    Ok(command_buffer_arcs)
}

// ~~ Swapchain ~~

pub fn swapchain_properties(
    surface_properties: &SurfaceProperties,
    queue_family_indices: QueueFamilyIndices,
) -> SwapchainProperties {
    // images are blitted to on the graphics queue and presented on the present queue
    let (sharing_mode, queue_family_indices) =
        if queue_family_indices.graphics == queue_family_indices.present {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![queue_family_indices.graphics, queue_family_indices.present],
            )
        };

    SwapchainProperties {
        image_count: surface_properties.image_count(),
        pre_transform: choose_pre_transform(&surface_properties.capabilities),
        composite_alpha: choose_composite_alpha(&surface_properties.capabilities),
        present_mode: surface_properties.present_mode,
        clipping_enabled: true,
        surface_format: surface_properties.format,
        width_height: surface_properties.width_height(),
        array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        sharing_mode,
        queue_family_indices,
        ..Default::default()
    }
}

pub fn create_swapchain(
    device: Arc<Device>,
    surface: Arc<Surface>,
    surface_properties: &SurfaceProperties,
    queue_family_indices: QueueFamilyIndices,
) -> anyhow::Result<Arc<Swapchain>> {
    let swapchain_properties = swapchain_properties(surface_properties, queue_family_indices);
    debug!(
        "creating swapchain with dimensions: {:?}, present mode: {:?}, image count: {}",
        swapchain_properties.width_height,
        swapchain_properties.present_mode,
        swapchain_properties.image_count
    );

    let swapchain =
        Swapchain::new(device, surface, swapchain_properties).context("creating swapchain")?;
    Ok(Arc::new(swapchain))
}

pub fn create_swapchain_image_views(
    swapchain: &Swapchain,
) -> anyhow::Result<Vec<Arc<ImageView<SwapchainImage>>>> {
    let image_view_properties = swapchain.image_view_properties();

    swapchain
        .swapchain_images()
        .iter()
        .map(|image| {
            ImageView::new(image.clone(), image_view_properties)
                .map(Arc::new)
                .context("creating swapchain image view")
        })
        .collect()
}

pub fn create_depth_buffer(
    memory_allocator: Arc<MemoryAllocator>,
    dimensions: ImageDimensions,
    depth_buffer_format: vk::Format,
) -> anyhow::Result<Arc<ImageView<Image>>> {
    let image = Image::new_tranient(
        memory_allocator,
        dimensions,
        depth_buffer_format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    )
    .context("creating depth buffer image")?;

    let image_view_properties =
        ImageViewProperties::from_image_properties_default(image.properties());
    let image_view = ImageView::new(Arc::new(image), image_view_properties)
        .context("creating depth buffer image view")?;
    Ok(Arc::new(image_view))
}

// ~~ Render Passes ~~

pub mod render_pass_indices {
    // scene render pass
    pub const ATTACHMENT_COLOR: usize = 0;
    pub const ATTACHMENT_DEPTH_BUFFER: usize = 1;
    pub const NUM_SCENE_ATTACHMENTS: usize = 2;

    // overlay render pass
    pub const ATTACHMENT_SWAPCHAIN: usize = 0;
    pub const NUM_OVERLAY_ATTACHMENTS: usize = 1;

    pub const SUBPASS_SCENE: usize = 0;
    pub const SUBPASS_OVERLAY: usize = 0;
}

/// Renders into the offscreen color target, leaving it ready to be blitted/copied from
pub fn create_scene_render_pass(
    device: Arc<Device>,
    color_format: vk::Format,
    depth_buffer_format: vk::Format,
) -> anyhow::Result<Arc<RenderPass>> {
    let mut attachment_descriptions =
        [vk::AttachmentDescription::default(); render_pass_indices::NUM_SCENE_ATTACHMENTS];

    attachment_descriptions[render_pass_indices::ATTACHMENT_COLOR] =
        vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .build();

    attachment_descriptions[render_pass_indices::ATTACHMENT_DEPTH_BUFFER] =
        vk::AttachmentDescription::builder()
            .format(depth_buffer_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

    let color_attachments = [vk::AttachmentReference::builder()
        .attachment(render_pass_indices::ATTACHMENT_COLOR as u32)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build()];
    let depth_attachment = vk::AttachmentReference::builder()
        .attachment(render_pass_indices::ATTACHMENT_DEPTH_BUFFER as u32)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();
    let subpasses = [Subpass::new(&color_attachments, Some(depth_attachment), &[])];

    let subpass_dependencies = [
        // previous frame's transfer reads of the color target and depth writes
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(render_pass_indices::SUBPASS_SCENE as u32)
            .src_stage_mask(
                vk::PipelineStageFlags::TRANSFER
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(
                vk::AccessFlags::TRANSFER_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            )
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(render_pass_indices::SUBPASS_SCENE as u32)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::TRANSFER)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
            .build(),
    ];

    let render_pass = RenderPass::new(
        device,
        attachment_descriptions,
        subpasses,
        subpass_dependencies,
    )
    .context("creating scene render pass")?;
    Ok(Arc::new(render_pass))
}

/// Draws on top of the blitted swapchain image and transitions it for presentation
pub fn create_overlay_render_pass(
    device: Arc<Device>,
    swapchain_format: vk::Format,
) -> anyhow::Result<Arc<RenderPass>> {
    let attachment_descriptions = [vk::AttachmentDescription::builder()
        .format(swapchain_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::LOAD)
        .store_op(vk::AttachmentStoreOp::STORE)
        .initial_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()];

    let color_attachments = [vk::AttachmentReference::builder()
        .attachment(render_pass_indices::ATTACHMENT_SWAPCHAIN as u32)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build()];
    let subpasses = [Subpass::new(&color_attachments, None, &[])];

    let subpass_dependencies = [vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(render_pass_indices::SUBPASS_OVERLAY as u32)
        .src_stage_mask(vk::PipelineStageFlags::TRANSFER)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .build()];

    let render_pass = RenderPass::new(
        device,
        attachment_descriptions,
        subpasses,
        subpass_dependencies,
    )
    .context("creating overlay render pass")?;
    Ok(Arc::new(render_pass))
}

/// One framebuffer per offscreen color target, all sharing the depth buffer
pub fn create_scene_framebuffers(
    render_pass: &Arc<RenderPass>,
    color_targets: &[Arc<ImageView<Image>>],
    depth_buffer: &Arc<ImageView<Image>>,
) -> anyhow::Result<Vec<Arc<Framebuffer>>> {
    color_targets
        .iter()
        .map(|color_target| {
            let mut attachments = Vec::<Arc<dyn ImageViewAccess>>::with_capacity(
                render_pass_indices::NUM_SCENE_ATTACHMENTS,
            );
            attachments.insert(render_pass_indices::ATTACHMENT_COLOR, color_target.clone());
            attachments.insert(
                render_pass_indices::ATTACHMENT_DEPTH_BUFFER,
                depth_buffer.clone(),
            );

            let framebuffer_properties =
                FramebufferProperties::new_default(attachments, color_target.image().dimensions());
            let framebuffer = Framebuffer::new(render_pass.clone(), framebuffer_properties)
                .context("creating scene framebuffer")?;
            Ok(Arc::new(framebuffer))
        })
        .collect()
}

pub fn create_overlay_framebuffers(
    render_pass: &Arc<RenderPass>,
    swapchain_image_views: &[Arc<ImageView<SwapchainImage>>],
) -> anyhow::Result<Vec<Arc<Framebuffer>>> {
    swapchain_image_views
        .iter()
        .map(|swapchain_image_view| {
            let attachments: Vec<Arc<dyn ImageViewAccess>> = vec![swapchain_image_view.clone()];
            let framebuffer_properties = FramebufferProperties::new_default(
                attachments,
                swapchain_image_view.image().dimensions(),
            );
            let framebuffer = Framebuffer::new(render_pass.clone(), framebuffer_properties)
                .context("creating overlay framebuffer")?;
            Ok(Arc::new(framebuffer))
        })
        .collect()
}

pub fn scene_clear_values() -> [vk::ClearValue; render_pass_indices::NUM_SCENE_ATTACHMENTS] {
    let mut clear_values = [vk::ClearValue::default(); render_pass_indices::NUM_SCENE_ATTACHMENTS];
    clear_values[render_pass_indices::ATTACHMENT_COLOR] = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    };
    clear_values[render_pass_indices::ATTACHMENT_DEPTH_BUFFER] = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.,
            stencil: 0,
        },
    };
    clear_values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_gpus_rank_highest() {
        let mut types = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::OTHER,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
        ];
        types.sort_by_key(|&t| std::cmp::Reverse(device_type_rank(t)));
        assert_eq!(
            types,
            [
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                vk::PhysicalDeviceType::VIRTUAL_GPU,
                vk::PhysicalDeviceType::CPU,
                vk::PhysicalDeviceType::OTHER,
            ]
        );
    }

    #[test]
    fn anisotropy_is_required() {
        assert!(!supports_required_features_1_0(
            vk::PhysicalDeviceFeatures::default()
        ));
        assert!(supports_required_features_1_0(required_features_1_0()));
    }
}
