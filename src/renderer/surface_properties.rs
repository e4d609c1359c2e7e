//! Surface format, present mode, depth format and extent selection.
//!
//! The selection functions only look at plain vulkan structs so they can be tested without a device.
//! [`SurfaceProperties::query`] gathers the inputs from the driver.

use super::config_renderer::{
    DEPTH_FORMAT_CANDIDATES, PREFERRED_IMAGE_COUNT, PREFERRED_SURFACE_FORMAT,
};
use anyhow::Context;
use ash::vk;
use bort_vk::{PhysicalDevice, Surface};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::fmt;

#[derive(Clone, Copy, Debug)]
pub struct SurfaceProperties {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
}

impl SurfaceProperties {
    /// Queries the surface support of `physical_device`. `window_extent` is only used when the
    /// surface leaves the extent up to the swapchain.
    pub fn query(
        physical_device: &PhysicalDevice,
        surface: &Surface,
        window_extent: [u32; 2],
    ) -> anyhow::Result<Self> {
        let capabilities = surface
            .get_physical_device_surface_capabilities(physical_device)
            .context("get_physical_device_surface_capabilities")?;
        let formats = surface
            .get_physical_device_surface_formats(physical_device)
            .context("get_physical_device_surface_formats")?;
        let present_modes = surface
            .get_physical_device_surface_present_modes(physical_device)
            .context("get_physical_device_surface_present_modes")?;

        trace!("surface capabilities: {:?}", capabilities);
        trace!("surface formats: {:?}", formats);
        trace!("surface present modes: {:?}", present_modes);

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes);
        let depth_format = choose_depth_format(|format| unsafe {
            physical_device
                .instance()
                .inner()
                .get_physical_device_format_properties(physical_device.handle(), format)
        })?;
        let extent = choose_extent(&capabilities, window_extent);

        Ok(Self {
            format,
            present_mode,
            depth_format,
            extent,
            capabilities,
        })
    }

    /// A zero sized extent (e.g. minimized window) can't be rendered to
    pub fn is_valid(&self) -> bool {
        self.extent.width > 0 && self.extent.height > 0
    }

    pub fn image_count(&self) -> u32 {
        choose_image_count(&self.capabilities)
    }

    pub fn width_height(&self) -> [u32; 2] {
        [self.extent.width, self.extent.height]
    }

    /// Takes `format` from `initial` and everything else from `self`. Render passes and pipelines
    /// are built for the initial format so it stays fixed for the lifetime of the renderer.
    pub fn keeping_format_of(self, initial: &SurfaceProperties) -> Self {
        let format_changed = self.format.format != initial.format.format
            || self.format.color_space != initial.format.color_space;
        if format_changed {
            warn!(
                "surface format changed from {:?} to {:?}. keeping the initial format",
                initial.format, self.format
            );
        }
        Self {
            format: initial.format,
            ..self
        }
    }
}

/// Prefers [`PREFERRED_SURFACE_FORMAT`], otherwise the first format offered
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, SurfaceError> {
    let first = formats.first().ok_or(SurfaceError::NoFormats)?;
    let preferred = formats.iter().find(|f| {
        f.format == PREFERRED_SURFACE_FORMAT.format
            && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
    });
    Ok(*preferred.unwrap_or(first))
}

/// Mailbox if available, otherwise fifo which is always supported
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// First entry of [`DEPTH_FORMAT_CANDIDATES`] usable as an optimal tiling depth attachment
pub fn choose_depth_format(
    format_properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format, SurfaceError> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(SurfaceError::NoDepthFormat)
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: [u32; 2],
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: window_extent[0].clamp(min.width, max.width.max(min.width)),
        height: window_extent[1].clamp(min.height, max.height.max(min.height)),
    }
}

/// Triple buffering when the surface allows it. A `max_image_count` of 0 means no upper limit.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    let max_allows_preferred = max == 0 || max >= PREFERRED_IMAGE_COUNT;
    if min < PREFERRED_IMAGE_COUNT && max_allows_preferred {
        PREFERRED_IMAGE_COUNT
    } else {
        min
    }
}

/// Identity if supported, otherwise whatever the surface is currently using
pub fn choose_pre_transform(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

pub fn choose_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&ca| capabilities.supported_composite_alpha.contains(ca))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

// ~~ Errors ~~

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    NoFormats,
    NoDepthFormat,
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFormats => write!(f, "surface reports no supported formats"),
            Self::NoDepthFormat => write!(
                f,
                "none of the depth formats {:?} support optimal tiling depth attachments",
                DEPTH_FORMAT_CANDIDATES
            ),
        }
    }
}

impl std::error::Error for SurfaceError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn surface_format_preference() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );

        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );

        assert_eq!(choose_surface_format(&[]), Err(SurfaceError::NoFormats));
    }

    #[test]
    fn srgb_format_in_wrong_color_space_is_not_preferred() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn depth_format_preference() {
        let supported = |supported: vk::Format| {
            move |format: vk::Format| vk::FormatProperties {
                optimal_tiling_features: if format == supported {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                } else {
                    vk::FormatFeatureFlags::empty()
                },
                ..Default::default()
            }
        };
        assert_eq!(
            choose_depth_format(supported(vk::Format::D24_UNORM_S8_UINT)),
            Ok(vk::Format::D24_UNORM_S8_UINT)
        );
        assert_eq!(
            choose_depth_format(|_| vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            }),
            Ok(vk::Format::D32_SFLOAT)
        );
        assert_eq!(
            choose_depth_format(supported(vk::Format::D16_UNORM)),
            Err(SurfaceError::NoDepthFormat)
        );
    }

    #[test]
    fn extent_selection() {
        let mut caps = capabilities(2, 3);
        assert_eq!(
            choose_extent(&caps, [800, 600]),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            choose_extent(&caps, [8000, 1]),
            vk::Extent2D {
                width: 4096,
                height: 16
            }
        );

        caps.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(choose_extent(&caps, [1, 1]), caps.current_extent);
    }

    #[test]
    fn image_count_selection() {
        assert_eq!(choose_image_count(&capabilities(2, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(4, 8)), 4);
    }

    #[test]
    fn minimized_surface_is_invalid() {
        let mut properties = SurfaceProperties {
            format: surface_format(vk::Format::B8G8R8A8_SRGB),
            present_mode: vk::PresentModeKHR::FIFO,
            depth_format: vk::Format::D32_SFLOAT,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            capabilities: capabilities(2, 3),
        };
        assert!(properties.is_valid());
        assert_eq!(properties.image_count(), 3);

        properties.extent.height = 0;
        assert!(!properties.is_valid());
    }

    #[test]
    fn requeried_properties_keep_the_initial_format() {
        let initial = SurfaceProperties {
            format: surface_format(vk::Format::B8G8R8A8_SRGB),
            present_mode: vk::PresentModeKHR::FIFO,
            depth_format: vk::Format::D32_SFLOAT,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            capabilities: capabilities(2, 3),
        };
        let minimized = SurfaceProperties {
            format: vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
            extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..initial
        }
        .keeping_format_of(&initial);
        assert!(!minimized.is_valid());
        assert_eq!(minimized.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            minimized.format.color_space,
            vk::ColorSpaceKHR::SRGB_NONLINEAR
        );
        assert_eq!(minimized.present_mode, vk::PresentModeKHR::MAILBOX);

        // restoring the window must not pick up the format seen while minimized
        let restored = SurfaceProperties {
            format: surface_format(vk::Format::R8G8B8A8_UNORM),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..minimized
        }
        .keeping_format_of(&minimized);
        assert!(restored.is_valid());
        assert_eq!(restored.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(restored.width_height(), [800, 600]);
    }

    #[test]
    fn transform_and_composite_alpha() {
        let mut caps = capabilities(2, 3);
        caps.supported_transforms =
            vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );

        caps.supported_composite_alpha =
            vk::CompositeAlphaFlagsKHR::INHERIT | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED;
        assert_eq!(
            choose_composite_alpha(&caps),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
    }
}
