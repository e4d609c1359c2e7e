use super::{config_renderer::MAX_FRAMES_IN_FLIGHT, surface_properties::SurfaceProperties};
use anyhow::Context;
use ash::vk;
use bort_vk::{
    Image, ImageDimensions, ImageProperties, ImageView, ImageViewProperties, MemoryAllocator,
};
use bort_vma::AllocationCreateInfo;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::sync::Arc;

const OFFSCREEN_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::SAMPLED.as_raw()
        | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
);

/// One color target per frame in flight. The scene renders here before being blitted to the
/// swapchain image.
pub struct OffscreenTargets {
    memory_allocator: Arc<MemoryAllocator>,
    format: vk::Format,
    extent: vk::Extent2D,
    image_views: Vec<Arc<ImageView<Image>>>,
}

impl OffscreenTargets {
    pub fn new(
        memory_allocator: Arc<MemoryAllocator>,
        properties: &SurfaceProperties,
    ) -> anyhow::Result<Self> {
        let format = properties.format.format;
        let extent = properties.extent;
        let image_views = create_targets(&memory_allocator, format, extent)?;
        Ok(Self {
            memory_allocator,
            format,
            extent,
            image_views,
        })
    }

    /// Rebuilds the targets if the extent or format changed. Returns whether anything was rebuilt.
    pub fn recreate(&mut self, properties: &SurfaceProperties) -> anyhow::Result<bool> {
        if !needs_recreate(self.format, self.extent, properties) {
            return Ok(false);
        }
        debug!(
            "recreating offscreen targets: {:?} {:?}",
            properties.format.format, properties.extent
        );

        self.destroy();
        self.format = properties.format.format;
        self.extent = properties.extent;
        self.image_views = create_targets(&self.memory_allocator, self.format, self.extent)?;
        Ok(true)
    }

    pub fn image_view(&self, frame_index: usize) -> Option<&Arc<ImageView<Image>>> {
        self.image_views.get(frame_index)
    }

    pub fn image_views(&self) -> &[Arc<ImageView<Image>>] {
        &self.image_views
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn destroy(&mut self) {
        self.image_views.clear();
    }
}

fn needs_recreate(
    format: vk::Format,
    extent: vk::Extent2D,
    properties: &SurfaceProperties,
) -> bool {
    format != properties.format.format
        || extent.width != properties.extent.width
        || extent.height != properties.extent.height
}

fn create_targets(
    memory_allocator: &Arc<MemoryAllocator>,
    format: vk::Format,
    extent: vk::Extent2D,
) -> anyhow::Result<Vec<Arc<ImageView<Image>>>> {
    (0..MAX_FRAMES_IN_FLIGHT)
        .map(|_| create_target(memory_allocator.clone(), format, extent))
        .collect()
}

fn create_target(
    memory_allocator: Arc<MemoryAllocator>,
    format: vk::Format,
    extent: vk::Extent2D,
) -> anyhow::Result<Arc<ImageView<Image>>> {
    let image_properties = ImageProperties::new_default(
        format,
        ImageDimensions::new_2d(extent.width, extent.height),
        OFFSCREEN_USAGE,
    );

    let allocation_info = AllocationCreateInfo {
        required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ..AllocationCreateInfo::default()
    };

    let image = Image::new(memory_allocator, image_properties, allocation_info)
        .context("creating offscreen target image")?;

    let image_view_properties =
        ImageViewProperties::from_image_properties_default(image.properties());
    let image_view = ImageView::new(Arc::new(image), image_view_properties)
        .context("creating offscreen target image view")?;
    Ok(Arc::new(image_view))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(format: vk::Format, width: u32, height: u32) -> SurfaceProperties {
        SurfaceProperties {
            format: vk::SurfaceFormatKHR {
                format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::FIFO,
            depth_format: vk::Format::D32_SFLOAT,
            extent: vk::Extent2D { width, height },
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
        }
    }

    #[test]
    fn recreate_only_on_extent_or_format_change() {
        let format = vk::Format::B8G8R8A8_SRGB;
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        assert!(!needs_recreate(format, extent, &properties(format, 800, 600)));
        assert!(needs_recreate(format, extent, &properties(format, 801, 600)));
        assert!(needs_recreate(format, extent, &properties(format, 800, 599)));
        assert!(needs_recreate(
            format,
            extent,
            &properties(vk::Format::R8G8B8A8_UNORM, 800, 600)
        ));
    }

    #[test]
    fn usage_covers_blit_and_screenshot() {
        assert!(OFFSCREEN_USAGE.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(OFFSCREEN_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(OFFSCREEN_USAGE.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(OFFSCREEN_USAGE.contains(vk::ImageUsageFlags::INPUT_ATTACHMENT));
    }
}
