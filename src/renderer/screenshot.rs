use super::{config_renderer::TIMEOUT_NANOSECS, memory::MemoryManager};
use anyhow::Context;
use ash::vk;
use bort_vk::{AllocationAccess, default_subresource_layers, CommandPool, Device, Fence, ImageAccess, Queue};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{
    fmt::{self, Display},
    path::Path,
    sync::Arc,
};

/// Copies `image` (in `TRANSFER_SRC_OPTIMAL` layout) into host memory and returns tightly packed
/// rgba8 rows. Blocks until the copy has completed.
pub fn capture(
    device: &Arc<Device>,
    queue: &Queue,
    command_pool: &Arc<CommandPool>,
    memory_manager: &MemoryManager,
    image: &impl ImageAccess,
    format: vk::Format,
    [width, height]: [u32; 2],
) -> anyhow::Result<Vec<u8>> {
    let size = width as vk::DeviceSize * height as vk::DeviceSize * 4;

    let mut readback_buffer = memory_manager.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_DST,
        "screenshot readback",
    )?;

    let command_buffer = command_pool
        .allocate_command_buffer(vk::CommandBufferLevel::PRIMARY)
        .context("allocating screenshot command buffer")?;

    let copy_region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: default_subresource_layers(vk::ImageAspectFlags::COLOR),
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
    };

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        let device_ash = device.inner();
        device_ash
            .begin_command_buffer(command_buffer.handle(), &begin_info)
            .context("beginning screenshot command buffer")?;

        device_ash.cmd_copy_image_to_buffer(
            command_buffer.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            readback_buffer.handle(),
            &[copy_region],
        );

        device_ash.cmd_pipeline_barrier(
            command_buffer.handle(),
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            vk::DependencyFlags::empty(),
            &[],
            &[host_read_barrier(readback_buffer.handle(), size)],
            &[],
        );

        device_ash
            .end_command_buffer(command_buffer.handle())
            .context("ending screenshot command buffer")?;
    }

    let fence = Fence::new_unsignalled(device.clone()).context("creating screenshot fence")?;
    let command_buffer_handles = [command_buffer.handle()];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffer_handles);
    queue
        .submit(&[submit_info.build()], Some(fence.handle()))
        .context("submitting screenshot commands")?;
    fence
        .wait(TIMEOUT_NANOSECS)
        .context("waiting for screenshot copy")?;

    let bytes = readback_buffer
        .memory_allocation_mut()
        .read_vec::<u8>(size as usize, 0)
        .context("reading screenshot buffer")?;

    let rgba = to_rgba8(&bytes, width, height, format)?;
    Ok(rgba)
}

/// Makes the copy into `buffer` visible to host reads
fn host_read_barrier(buffer: vk::Buffer, size: vk::DeviceSize) -> vk::BufferMemoryBarrier {
    vk::BufferMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::HOST_READ)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(size)
        .build()
}

/// Converts 4-byte-per-pixel image data to rgba8
pub fn to_rgba8(
    bytes: &[u8],
    width: u32,
    height: u32,
    format: vk::Format,
) -> Result<Vec<u8>, ScreenshotError> {
    let expected = width as usize * 4 * height as usize;
    if bytes.len() < expected {
        return Err(ScreenshotError::TooFewBytes {
            expected,
            actual: bytes.len(),
        });
    }
    let bytes = &bytes[..expected];

    match format {
        vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UNORM => Ok(bytes
            .chunks_exact(4)
            .flat_map(|bgra| [bgra[2], bgra[1], bgra[0], bgra[3]])
            .collect()),
        vk::Format::R8G8B8A8_SRGB | vk::Format::R8G8B8A8_UNORM => Ok(bytes.to_vec()),
        _ => Err(ScreenshotError::UnsupportedFormat(format)),
    }
}

pub fn write_png(path: impl AsRef<Path>, rgba: &[u8], width: u32, height: u32) -> anyhow::Result<()> {
    let path = path.as_ref();
    image::save_buffer_with_format(
        path,
        rgba,
        width,
        height,
        image::ExtendedColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("writing screenshot to {:?}", path))?;
    info!("saved screenshot to {:?}", path);
    Ok(())
}

// ~~ Errors ~~

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotError {
    UnsupportedFormat(vk::Format),
    TooFewBytes { expected: usize, actual: usize },
}
impl std::error::Error for ScreenshotError {}
impl Display for ScreenshotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(format) => {
                write!(f, "cannot convert image format {:?} to rgba8", format)
            }
            Self::TooFewBytes { expected, actual } => write!(
                f,
                "screenshot data has {} bytes but {} are required",
                actual, expected
            ),
        }
    }
}

// ~~ Tests ~~

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_is_swizzled() {
        let bgra = [1, 2, 3, 4, 5, 6, 7, 8];
        let rgba = to_rgba8(&bgra, 2, 1, vk::Format::B8G8R8A8_SRGB).unwrap();
        assert_eq!(rgba, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn rgba_passes_through_and_trims_padding() {
        let data = [9, 8, 7, 6, 0, 0];
        let rgba = to_rgba8(&data, 1, 1, vk::Format::R8G8B8A8_UNORM).unwrap();
        assert_eq!(rgba, vec![9, 8, 7, 6]);
    }

    #[test]
    fn unsupported_input() {
        assert_eq!(
            to_rgba8(&[0; 8], 1, 1, vk::Format::R16G16_SFLOAT),
            Err(ScreenshotError::UnsupportedFormat(vk::Format::R16G16_SFLOAT))
        );
        assert_eq!(
            to_rgba8(&[0; 4], 2, 1, vk::Format::R8G8B8A8_SRGB),
            Err(ScreenshotError::TooFewBytes {
                expected: 8,
                actual: 4,
            })
        );
    }

    #[test]
    fn readback_is_made_visible_to_the_host() {
        let barrier = host_read_barrier(vk::Buffer::null(), 64);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::HOST_READ);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.offset, 0);
        assert_eq!(barrier.size, 64);
    }

    #[test]
    fn png_round_trip() {
        let path = std::env::temp_dir().join(format!("screenshot_test_{}.png", std::process::id()));
        let rgba = vec![255, 0, 0, 255, 0, 255, 0, 128];
        write_png(&path, &rgba, 2, 1).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.into_raw(), rgba);
        std::fs::remove_file(&path).unwrap();
    }
}
