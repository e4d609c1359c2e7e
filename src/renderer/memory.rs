use super::{
    config_renderer::{
        BUFFER_MEMORY_BLOCK_SIZE, IMAGE_MEMORY_BLOCK_SIZE, STAGING_MEMORY_BLOCK_SIZE,
    },
    shader_interfaces::{uniform_buffers::ModelUniformBuffer, vertex_inputs::Vertex},
};
use crate::scene::object::Object;
use ahash::AHashMap;
use anyhow::Context;
use ash::vk;
use bort_vk::{
    AllocationAccess,
    allocation_info_cpu_accessible, allocation_info_from_flags, default_subresource_layers,
    Buffer, BufferProperties, CommandBuffer, Device, Image, ImageAccess, ImageDimensions,
    ImageProperties, ImageView, ImageViewProperties, MemoryAllocator, MemoryPool,
    MemoryPoolPropeties, Sampler, SamplerProperties,
};
use bort_vma::Alloc;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{
    fmt::{self, Display},
    mem,
    sync::Arc,
};

// ~~ Layout ~~

/// Rounds `size` up to a multiple of `alignment`. An alignment of 0 leaves `size` unchanged.
pub fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        return size;
    }
    debug_assert!(
        alignment.is_power_of_two(),
        "alignment {} is not a power of two",
        alignment
    );
    (size + alignment - 1) & !(alignment - 1)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshRange {
    pub vertex_offset: vk::DeviceSize,
    pub index_offset: vk::DeviceSize,
}

/// Byte layout of the unified model buffer: all vertices, then all indices (u32), then one
/// uniform block per object starting at an aligned offset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelBufferLayout {
    pub mesh_ranges: Vec<MeshRange>,
    pub vertex_buffer_size: vk::DeviceSize,
    pub index_buffer_size: vk::DeviceSize,
    pub uniform_offset: vk::DeviceSize,
    pub uniform_size: vk::DeviceSize,
    pub total_size: vk::DeviceSize,
}

impl ModelBufferLayout {
    /// `meshes` holds `(vertex_count, index_count)` per object
    pub fn compute(
        meshes: &[(usize, usize)],
        vertex_size: vk::DeviceSize,
        min_uniform_alignment: vk::DeviceSize,
        uniform_size: vk::DeviceSize,
    ) -> Self {
        let vertex_count: usize = meshes.iter().map(|(v, _)| v).sum();
        let index_count: usize = meshes.iter().map(|(_, i)| i).sum();
        let vertex_buffer_size = vertex_count as vk::DeviceSize * vertex_size;
        let index_buffer_size = index_count as vk::DeviceSize * mem::size_of::<u32>() as u64;

        let mut vertices_so_far = 0;
        let mut indices_so_far = 0;
        let mesh_ranges = meshes
            .iter()
            .map(|&(vertices, indices)| {
                let range = MeshRange {
                    vertex_offset: vertices_so_far as vk::DeviceSize * vertex_size,
                    index_offset: vertex_buffer_size
                        + indices_so_far as vk::DeviceSize * mem::size_of::<u32>() as u64,
                };
                vertices_so_far += vertices;
                indices_so_far += indices;
                range
            })
            .collect::<Vec<_>>();

        let uniform_offset = align_up(vertex_buffer_size + index_buffer_size, min_uniform_alignment);
        let total_size = uniform_offset + uniform_size * meshes.len() as vk::DeviceSize;

        Self {
            mesh_ranges,
            vertex_buffer_size,
            index_buffer_size,
            uniform_offset,
            uniform_size,
            total_size,
        }
    }

    pub fn object_uniform_offset(&self, object_index: usize) -> vk::DeviceSize {
        self.uniform_offset + object_index as vk::DeviceSize * self.uniform_size
    }

    /// Byte offset and contents of each object's model uniform block
    pub fn model_uniform_writes(
        &self,
        objects: &[Object],
    ) -> Vec<(vk::DeviceSize, ModelUniformBuffer)> {
        objects
            .iter()
            .enumerate()
            .map(|(index, object)| {
                (
                    self.object_uniform_offset(index),
                    ModelUniformBuffer::new(object.model_matrix()),
                )
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPool {
    Staging,
    Buffer,
}

/// Allocations larger than a buffer pool block go to the staging pool
pub fn choose_buffer_pool(size: vk::DeviceSize) -> BufferPool {
    if size > BUFFER_MEMORY_BLOCK_SIZE {
        BufferPool::Staging
    } else {
        BufferPool::Buffer
    }
}

// ~~ Registry ~~

struct RegistryEntry<T> {
    value: T,
    refs: u32,
}

/// Reference counted storage keyed by sequential ids
pub struct AllocationRegistry<T> {
    entries: AHashMap<u32, RegistryEntry<T>>,
    next_id: u32,
}

impl<T> AllocationRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
            next_id: 0,
        }
    }

    /// Ids restart from 0 whenever the registry is empty
    pub fn insert(&mut self, value: T, refs: u32) -> u32 {
        if self.entries.is_empty() {
            self.next_id = 0;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, RegistryEntry { value, refs });
        id
    }

    pub fn acquire(&mut self, id: u32, n: u32) -> Result<(), AllocationError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(AllocationError::UnknownId(id))?;
        entry.refs += n;
        Ok(())
    }

    /// Returns the value once its last reference is released
    pub fn release(&mut self, id: u32) -> Result<Option<T>, AllocationError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(AllocationError::UnknownId(id))?;
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return Ok(None);
        }
        Ok(self.entries.remove(&id).map(|e| e.value))
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.get(&id).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.entries.get_mut(&id).map(|e| &mut e.value)
    }

    pub fn refs(&self, id: u32) -> Option<u32> {
        self.entries.get(&id).map(|e| e.refs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes everything regardless of reference counts
    pub fn drain(&mut self) -> impl Iterator<Item = (u32, T)> + '_ {
        self.entries.drain().map(|(id, e)| (id, e.value))
    }
}

impl<T> Default for AllocationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ~~ Memory Manager ~~

pub struct MemoryManager {
    device: Arc<Device>,
    memory_allocator: Arc<MemoryAllocator>,
    staging_pool: Arc<MemoryPool>,
    buffer_pool: Arc<MemoryPool>,
    image_pool: Arc<MemoryPool>,
    min_uniform_alignment: vk::DeviceSize,

    buffers: AllocationRegistry<Buffer>,
    textures: AllocationRegistry<Arc<ImageView<Image>>>,
    texture_sampler: Arc<Sampler>,
    /// Kept alive until the commands copying from them have completed
    pending_staging_buffers: Vec<Buffer>,
}

impl MemoryManager {
    pub fn new(
        device: Arc<Device>,
        min_uniform_alignment: vk::DeviceSize,
    ) -> anyhow::Result<Self> {
        let memory_allocator = Arc::new(
            MemoryAllocator::new(device.clone()).context("creating memory allocator")?,
        );

        let staging_pool = create_buffer_pool(
            &memory_allocator,
            STAGING_MEMORY_BLOCK_SIZE,
            0,
            "staging",
        )?;
        let buffer_pool = create_buffer_pool(
            &memory_allocator,
            BUFFER_MEMORY_BLOCK_SIZE,
            min_uniform_alignment,
            "buffer",
        )?;
        let image_pool = create_image_pool(&memory_allocator)?;

        let texture_sampler = create_texture_sampler(device.clone())?;

        Ok(Self {
            device,
            memory_allocator,
            staging_pool,
            buffer_pool,
            image_pool,
            min_uniform_alignment,

            buffers: AllocationRegistry::new(),
            textures: AllocationRegistry::new(),
            texture_sampler,
            pending_staging_buffers: Vec::new(),
        })
    }

    /// Host visible buffer allocated from the pool matching `size`
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        identifier: &str,
    ) -> anyhow::Result<Buffer> {
        let pool = match choose_buffer_pool(size) {
            BufferPool::Staging => self.staging_pool.clone(),
            BufferPool::Buffer => self.buffer_pool.clone(),
        };
        trace!(
            "allocating Buffer: {} ({} bytes, {:?} pool)",
            identifier,
            size,
            choose_buffer_pool(size)
        );

        let buffer_props = BufferProperties::new_default(size, usage);
        Buffer::new(pool, buffer_props, allocation_info_cpu_accessible())
            .with_context(|| format!("creating Buffer: {}", identifier))
    }

    /// Creates one buffer holding the vertices, indices and model uniforms of every object and
    /// writes back each object's buffer id and offsets. Object transforms are fixed once uploaded
    /// so the model uniforms are only written here and frames in flight never race a host write.
    pub fn allocate_models_buffer(&mut self, objects: &mut [Object]) -> anyhow::Result<Option<u32>> {
        if objects.is_empty() {
            return Ok(None);
        }

        let meshes = objects
            .iter()
            .map(|o| (o.mesh.vertices.len(), o.mesh.indices.len()))
            .collect::<Vec<_>>();
        // per-object uniform blocks are bound with descriptor offsets so each must be aligned
        let uniform_size = align_up(
            mem::size_of::<ModelUniformBuffer>() as vk::DeviceSize,
            self.min_uniform_alignment,
        );
        let layout = ModelBufferLayout::compute(
            &meshes,
            mem::size_of::<Vertex>() as vk::DeviceSize,
            self.min_uniform_alignment,
            uniform_size,
        );

        let mut buffer = self.create_buffer(
            layout.total_size,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::UNIFORM_BUFFER,
            "models",
        )?;

        for (index, (object, range)) in objects.iter_mut().zip(&layout.mesh_ranges).enumerate() {
            if !object.mesh.vertices.is_empty() {
                buffer
                    .write_iter(object.mesh.vertices.iter().copied(), range.vertex_offset as usize)
                    .with_context(|| format!("uploading vertices of {}", object.name))?;
            }
            if !object.mesh.indices.is_empty() {
                buffer
                    .write_iter(object.mesh.indices.iter().copied(), range.index_offset as usize)
                    .with_context(|| format!("uploading indices of {}", object.name))?;
            }

            object.mesh.vertex_offset = range.vertex_offset;
            object.mesh.index_offset = range.index_offset;
            object.uniform_offset = layout.object_uniform_offset(index);
        }
        for (offset, model_ubo) in layout.model_uniform_writes(objects) {
            buffer
                .write_iter([model_ubo], offset as usize)
                .context("writing model uniforms")?;
        }

        let buffer_id = self.buffers.insert(buffer, objects.len() as u32);
        for object in objects.iter_mut() {
            object.buffer_id = Some(buffer_id);
        }

        debug!(
            "allocated models buffer {} for {} objects ({} bytes)",
            buffer_id,
            objects.len(),
            layout.total_size
        );
        Ok(Some(buffer_id))
    }

    /// Records the upload of `rgba` into a new sampled image. The staging buffer stays alive until
    /// [`Self::free_staging_buffers`] is called after the commands have completed.
    pub fn allocate_texture(
        &mut self,
        command_buffer: &CommandBuffer,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> anyhow::Result<u32> {
        let mut staging_buffer = self.create_buffer(
            rgba.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "texture staging",
        )?;
        staging_buffer
            .write_iter(rgba.iter().copied(), 0)
            .context("uploading texture data to staging buffer")?;

        let image_properties = ImageProperties {
            format,
            dimensions: ImageDimensions::new_2d(width, height),
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let image_allocation_info = allocation_info_from_flags(
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::empty(),
        );
        let image = Arc::new(
            Image::new(
                self.image_pool.clone(),
                image_properties.clone(),
                image_allocation_info,
            )
            .context("creating texture image")?,
        );

        let copy_region = vk::BufferImageCopy {
            image_subresource: default_subresource_layers(vk::ImageAspectFlags::COLOR),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            ..Default::default()
        };

        let image_view_properties =
            ImageViewProperties::from_image_properties_default(&image_properties);
        let subresource_range = image_view_properties.subresource_range;

        let before_transfer_image_barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image(image.handle())
            .subresource_range(subresource_range)
            .build();

        let after_transfer_image_barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image(image.handle())
            .subresource_range(subresource_range)
            .build();

        unsafe {
            let device_ash = self.device.inner();
            let command_buffer_handle = command_buffer.handle();

            device_ash.cmd_pipeline_barrier(
                command_buffer_handle,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[before_transfer_image_barrier],
            );

            device_ash.cmd_copy_buffer_to_image(
                command_buffer_handle,
                staging_buffer.handle(),
                image.handle(),
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
                &[after_transfer_image_barrier],
            );
        }

        let image_view = Arc::new(
            ImageView::new(image, image_view_properties).context("creating texture image view")?,
        );

        self.pending_staging_buffers.push(staging_buffer);
        let texture_id = self.textures.insert(image_view, 1);
        trace!("allocated texture {} ({}x{})", texture_id, width, height);
        Ok(texture_id)
    }

    /// Call once the commands recorded by [`Self::allocate_texture`] have finished executing
    pub fn free_staging_buffers(&mut self) {
        self.pending_staging_buffers.clear();
    }

    /// Adds `n` references to a texture
    pub fn acquire_texture(&mut self, texture_id: u32, n: u32) -> Result<(), AllocationError> {
        self.textures.acquire(texture_id, n)
    }

    pub fn release_object(&mut self, buffer_id: u32) -> Result<(), AllocationError> {
        if self.buffers.release(buffer_id)?.is_some() {
            trace!("freed models buffer {}", buffer_id);
        }
        Ok(())
    }

    pub fn release_texture(&mut self, texture_id: u32) -> Result<(), AllocationError> {
        if self.textures.release(texture_id)?.is_some() {
            trace!("freed texture {}", texture_id);
        }
        Ok(())
    }

    /// Frees every buffer and texture. The device must be idle.
    pub fn release_all(&mut self) {
        let buffer_count = self.buffers.drain().count();
        let texture_count = self.textures.drain().count();
        self.pending_staging_buffers.clear();
        debug!(
            "released {} buffers and {} textures",
            buffer_count, texture_count
        );
    }

    // ~~ Getters ~~

    pub fn buffer(&self, buffer_id: u32) -> Option<&Buffer> {
        self.buffers.get(buffer_id)
    }

    pub fn texture(&self, texture_id: u32) -> Option<&Arc<ImageView<Image>>> {
        self.textures.get(texture_id)
    }

    pub fn texture_sampler(&self) -> &Arc<Sampler> {
        &self.texture_sampler
    }

    pub fn memory_allocator(&self) -> &Arc<MemoryAllocator> {
        &self.memory_allocator
    }

    pub fn min_uniform_alignment(&self) -> vk::DeviceSize {
        self.min_uniform_alignment
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

// ~~ Helper Functions ~~

fn create_buffer_pool(
    memory_allocator: &Arc<MemoryAllocator>,
    block_size: vk::DeviceSize,
    min_allocation_alignment: vk::DeviceSize,
    name: &str,
) -> anyhow::Result<Arc<MemoryPool>> {
    let buffer_alloc_info = allocation_info_cpu_accessible();

    let buffer_info = vk::BufferCreateInfo::builder().size(block_size).usage(
        vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::INDEX_BUFFER
            | vk::BufferUsageFlags::UNIFORM_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST,
    );

    let memory_type_index = unsafe {
        memory_allocator
            .inner()
            .find_memory_type_index_for_buffer_info(&buffer_info, &buffer_alloc_info)
    }
    .with_context(|| format!("finding memory type index for {} pool", name))?;

    let pool_props = MemoryPoolPropeties {
        memory_type_index,
        block_size,
        min_allocation_alignment,
        ..Default::default()
    };

    let memory_pool = MemoryPool::new(memory_allocator.clone(), pool_props)
        .with_context(|| format!("creating {} memory pool", name))?;
    Ok(Arc::new(memory_pool))
}

fn create_image_pool(memory_allocator: &Arc<MemoryAllocator>) -> anyhow::Result<Arc<MemoryPool>> {
    let image_alloc_info = allocation_info_from_flags(
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::MemoryPropertyFlags::empty(),
    );

    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk::Format::R8G8B8A8_SRGB)
        .extent(vk::Extent3D {
            width: 1,
            height: 1,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED);

    let memory_type_index = unsafe {
        memory_allocator
            .inner()
            .find_memory_type_index_for_image_info(&image_info, &image_alloc_info)
    }
    .context("finding memory type index for image pool")?;

    let pool_props = MemoryPoolPropeties {
        memory_type_index,
        block_size: IMAGE_MEMORY_BLOCK_SIZE,
        ..Default::default()
    };

    let memory_pool =
        MemoryPool::new(memory_allocator.clone(), pool_props).context("creating image pool")?;
    Ok(Arc::new(memory_pool))
}

fn create_texture_sampler(device: Arc<Device>) -> anyhow::Result<Arc<Sampler>> {
    let sampler_props = SamplerProperties {
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        address_mode: [vk::SamplerAddressMode::REPEAT; 3],
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        anisotropy_enable: false,
        max_lod: vk::LOD_CLAMP_NONE,
        ..Default::default()
    };

    let sampler = Sampler::new(device, sampler_props).context("creating texture sampler")?;
    Ok(Arc::new(sampler))
}

// ~~ Errors ~~

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    UnknownId(u32),
}
impl std::error::Error for AllocationError {}
impl Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownId(id) => write!(f, "no allocation registered with id {}", id),
        }
    }
}

// ~~ Tests ~~

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 64), 320);
        assert_eq!(align_up(13, 0), 13);
    }

    #[test]
    fn model_buffer_layout_offsets() {
        // vertex size 64, two meshes with 3 and 4 vertices, 3 and 6 indices
        let layout = ModelBufferLayout::compute(&[(3, 3), (4, 6)], 64, 256, 128);

        assert_eq!(layout.vertex_buffer_size, 7 * 64);
        assert_eq!(layout.index_buffer_size, 9 * 4);
        assert_eq!(
            layout.mesh_ranges,
            vec![
                MeshRange {
                    vertex_offset: 0,
                    index_offset: 448,
                },
                MeshRange {
                    vertex_offset: 192,
                    index_offset: 448 + 12,
                },
            ]
        );
        // 448 + 36 = 484 rounded up to 512
        assert_eq!(layout.uniform_offset, 512);
        assert_eq!(layout.object_uniform_offset(0), 512);
        assert_eq!(layout.object_uniform_offset(1), 640);
        assert_eq!(layout.total_size, 512 + 2 * 128);
    }

    #[test]
    fn model_uniforms_follow_the_index_data() {
        use crate::scene::{
            mesh::{MaterialTextures, Mesh},
            object::Transform,
        };
        use glam::{Quat, Vec3};

        let transform = Transform {
            translation: Vec3::new(1., 2., 3.),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        };
        let objects = [
            Object::new("a", Mesh::default(), Transform::IDENTITY),
            Object::new(
                "b",
                Mesh::new(Vec::new(), Vec::new(), MaterialTextures::default()),
                transform,
            ),
        ];
        let layout = ModelBufferLayout::compute(&[(3, 3), (4, 6)], 64, 256, 128);

        let writes = layout.model_uniform_writes(&objects);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, 512);
        assert_eq!(writes[1].0, 640);
        assert!(writes[0].0 >= layout.vertex_buffer_size + layout.index_buffer_size);
        assert!(writes[1].0 + mem::size_of::<ModelUniformBuffer>() as u64 <= layout.total_size);
        assert_eq!(writes[1].1.model, transform.matrix().to_cols_array());
    }

    #[test]
    fn empty_layout() {
        let layout = ModelBufferLayout::compute(&[], 64, 256, 128);
        assert!(layout.mesh_ranges.is_empty());
        assert_eq!(layout.total_size, 0);
    }

    #[test]
    fn buffer_pool_choice() {
        assert_eq!(choose_buffer_pool(1), BufferPool::Buffer);
        assert_eq!(
            choose_buffer_pool(BUFFER_MEMORY_BLOCK_SIZE),
            BufferPool::Buffer
        );
        assert_eq!(
            choose_buffer_pool(BUFFER_MEMORY_BLOCK_SIZE + 1),
            BufferPool::Staging
        );
    }

    #[test]
    fn registry_reference_counting() {
        let mut registry = AllocationRegistry::new();
        let id = registry.insert("mesh", 2);
        assert_eq!(registry.refs(id), Some(2));

        registry.acquire(id, 1).unwrap();
        assert_eq!(registry.release(id), Ok(None));
        assert_eq!(registry.release(id), Ok(None));
        assert_eq!(registry.release(id), Ok(Some("mesh")));
        assert!(registry.is_empty());
        assert_eq!(registry.release(id), Err(AllocationError::UnknownId(id)));
        assert_eq!(registry.acquire(7, 1), Err(AllocationError::UnknownId(7)));
    }

    #[test]
    fn registry_ids_restart_when_empty() {
        let mut registry = AllocationRegistry::new();
        assert_eq!(registry.insert('a', 1), 0);
        assert_eq!(registry.insert('b', 1), 1);

        registry.release(0).unwrap();
        // still holds 'b' so the counter keeps going
        assert_eq!(registry.insert('c', 1), 2);

        let mut drained = registry.drain().collect::<Vec<_>>();
        drained.sort();
        assert_eq!(drained, vec![(1, 'b'), (2, 'c')]);
        assert_eq!(registry.len(), 0);

        assert_eq!(registry.insert('d', 1), 0);
        assert_eq!(registry.get(0), Some(&'d'));
        assert_eq!(registry.get(1), None);
    }
}
