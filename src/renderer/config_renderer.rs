use ash::vk;
use bort_vk::ApiVersion;
use std::time::Duration;

pub const MAX_VULKAN_VER: ApiVersion = ApiVersion { major: 1, minor: 3 };
pub const MIN_VULKAN_VER: ApiVersion = ApiVersion { major: 1, minor: 3 };

/// If true, the renderer will attempt to enable khronos valication layer. If VK_LAYER_KHRONOS_validation
/// is installed on the system, a debug callback will be created to log layer messages.
pub const ENABLE_VULKAN_VALIDATION: bool = cfg!(debug_assertions);

/// Function name of the entry point for shaders
pub const SHADER_ENTRY_POINT: &str = "main";

/// Directory containing glsl sources. Compiled spirv is cached next to each source.
pub const SHADER_DIR: &str = "assets/shaders";
pub const SCENE_SHADER_NAME: &str = "scene";
pub const OVERLAY_SHADER_NAME: &str = "overlay";

/// 1 second
pub const TIMEOUT_NANOSECS: u64 = 1_000_000_000;

/// Double-buffering
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Preferred swapchain image count (clamped to surface capabilities)
pub const PREFERRED_IMAGE_COUNT: u32 = 3;

/// Size of vma memory blocks for the buffer pool. Larger allocations go to the staging pool.
pub const BUFFER_MEMORY_BLOCK_SIZE: vk::DeviceSize = 64 * 1024 * 1024;
pub const STAGING_MEMORY_BLOCK_SIZE: vk::DeviceSize = 256 * 1024 * 1024;
pub const IMAGE_MEMORY_BLOCK_SIZE: vk::DeviceSize = 256 * 1024 * 1024;

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// In order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Material textures are uploaded in this format (gltf color textures are srgb encoded)
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// How long `draw_frame` idles when the surface can't be rendered to (e.g. minimized window)
pub const INVALID_PROPERTIES_SLEEP: Duration = Duration::from_millis(100);

pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.12, 1.];

/// Direction the scene light travels in world space
pub const LIGHT_DIRECTION: [f32; 3] = [-0.4, -1., -0.6];
