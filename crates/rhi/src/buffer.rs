//! GPU buffer management.
//!
//! This module handles vertex, index, uniform, and staging buffers.
//! It uses gpu-allocator for memory management and provides safe abstractions
//! for buffer creation and data transfer.
//!
//! # Overview
//!
//! - [`BufferUsage`] defines how a buffer will be used (vertex, index, uniform, etc.)
//! - [`Buffer`] wraps VkBuffer with gpu-allocator managed memory, carved into
//!   `instance_count` equally-sized slots whose stride honors a minimum
//!   alignment (e.g. `minUniformBufferOffsetAlignment` for dynamic uniforms)
//! - [`align_up`] rounds a size up to an alignment boundary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! // One uniform slot per frame in flight, aligned for dynamic offsets.
//! let min_align = device.min_uniform_buffer_offset_alignment();
//! let mut ubo = Buffer::new(device, BufferUsage::Uniform, 208, 2, min_align)?;
//! ubo.map()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `size` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two and at least 1. An already-aligned
/// size is returned unchanged.
#[inline]
pub fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    debug_assert!(alignment >= 1 && alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which affects
/// Vulkan usage flags and memory allocation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Index buffer - stores index data
    Index,
    /// Uniform buffer - stores shader uniform data
    Uniform,
    /// Storage buffer - general-purpose GPU storage
    Storage,
    /// Staging buffer - CPU-writable for data upload
    Staging,
    /// Readback buffer - GPU-written, CPU-read (e.g. picking results)
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => {
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Returns the preferred memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            // CPU-visible for easy upload (host coherent)
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::CpuToGpu,
            // Uniform buffers need frequent CPU updates
            BufferUsage::Uniform => MemoryLocation::CpuToGpu,
            // Storage buffers typically GPU-only
            BufferUsage::Storage => MemoryLocation::GpuOnly,
            // Staging buffers are CPU-writable
            BufferUsage::Staging => MemoryLocation::CpuToGpu,
            // Readback buffers are GPU-written and CPU-read
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// GPU buffer wrapper with managed memory.
///
/// The buffer is divided into `instance_count` slots of `alignment_size`
/// bytes each, where `alignment_size` is `instance_size` rounded up to the
/// caller-provided minimum alignment. With `instance_count == 1` and
/// `min_alignment == 1` this degenerates to a plain byte buffer.
///
/// Memory is managed by gpu-allocator, which handles suballocation and
/// memory type selection.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Synchronize access externally
/// when sharing between threads.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Size of one instance, before alignment.
    instance_size: vk::DeviceSize,
    /// Stride between consecutive instances.
    alignment_size: vk::DeviceSize,
    /// Number of instance slots.
    instance_count: vk::DeviceSize,
    /// Total buffer size in bytes (`alignment_size * instance_count`).
    size: vk::DeviceSize,
    /// Buffer usage type.
    usage: BufferUsage,
    /// Whether the buffer has been mapped via [`Buffer::map`].
    mapped: bool,
}

impl Buffer {
    /// Creates a new buffer of `instance_count` slots of `instance_size`
    /// bytes, each aligned up to `min_alignment`.
    ///
    /// Allocation and binding happen atomically; failure leaves no live
    /// Vulkan objects behind. Allocation failure is unrecoverable and
    /// propagates to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the computed size is zero, or if buffer creation
    /// or memory allocation fails.
    pub fn new(
        device: Arc<Device>,
        usage: BufferUsage,
        instance_size: vk::DeviceSize,
        instance_count: vk::DeviceSize,
        min_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if instance_size == 0 || instance_count == 0 {
            return Err(RhiError::InvalidArgument(
                "Buffer instance size and count must be greater than 0".to_string(),
            ));
        }

        let alignment_size = align_up(instance_size, min_alignment.max(1));
        let size = alignment_size * instance_count;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = match device.allocator().lock() {
                Ok(a) => a,
                Err(poisoned) => poisoned.into_inner(),
            };
            match allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.handle().destroy_buffer(buffer, None) };
                    return Err(e.into());
                }
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!(
            "Created {} buffer: {} x {} bytes (stride {})",
            usage.name(),
            instance_count,
            instance_size,
            alignment_size
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            instance_size,
            alignment_size,
            instance_count,
            size,
            usage,
            mapped: false,
        })
    }

    /// Creates a single-slot buffer and initializes it with data.
    ///
    /// Convenience for setup-time uploads (vertex/index/staging data). The
    /// usage must select CPU-visible memory.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the initial write fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let mut buffer = Self::new(device, usage, data.len() as vk::DeviceSize, 1, 1)?;
        buffer.map()?;
        buffer.write_to_buffer(data, 0)?;
        Ok(buffer)
    }

    /// Marks the buffer as mapped for CPU writes.
    ///
    /// gpu-allocator keeps CPU-visible allocations persistently mapped, so
    /// this only verifies a CPU address exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NotHostVisible`] when the allocation has no CPU
    /// address (e.g. `GpuOnly` memory).
    pub fn map(&mut self) -> RhiResult<()> {
        let allocation = self.allocation.as_ref().ok_or(RhiError::NotHostVisible)?;
        if allocation.mapped_ptr().is_none() {
            return Err(RhiError::NotHostVisible);
        }
        self.mapped = true;
        Ok(())
    }

    /// Marks the buffer as unmapped.
    ///
    /// The allocator owns the persistent mapping, so no Vulkan call is made.
    /// Safe to call repeatedly.
    pub fn unmap(&mut self) {
        self.mapped = false;
    }

    /// Writes `data` at `offset` bytes into the mapped buffer.
    ///
    /// Precondition: the buffer is mapped. Violating it is a programmer
    /// error and returns [`RhiError::NotMapped`].
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped or the write would
    /// exceed the buffer size.
    pub fn write_to_buffer(&self, data: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
        debug_assert!(self.mapped, "write_to_buffer called on unmapped buffer");
        if !self.mapped {
            return Err(RhiError::NotMapped);
        }
        if data.is_empty() {
            return Ok(());
        }

        self.check_range(offset, data.len() as vk::DeviceSize)?;

        let allocation = self.allocation.as_ref().ok_or(RhiError::NotMapped)?;
        let mapped_ptr = allocation.mapped_ptr().ok_or(RhiError::NotHostVisible)?;

        unsafe {
            let dst = mapped_ptr.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, data.len());
        }

        Ok(())
    }

    /// Reads `data.len()` bytes at `offset` out of the mapped buffer.
    ///
    /// Used for readback buffers after the GPU write has completed. Same
    /// mapping precondition as [`Buffer::write_to_buffer`].
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped or the read would
    /// exceed the buffer size.
    pub fn read_from_buffer(&self, data: &mut [u8], offset: vk::DeviceSize) -> RhiResult<()> {
        debug_assert!(self.mapped, "read_from_buffer called on unmapped buffer");
        if !self.mapped {
            return Err(RhiError::NotMapped);
        }
        if data.is_empty() {
            return Ok(());
        }

        self.check_range(offset, data.len() as vk::DeviceSize)?;

        let allocation = self.allocation.as_ref().ok_or(RhiError::NotMapped)?;
        let mapped_ptr = allocation.mapped_ptr().ok_or(RhiError::NotHostVisible)?;

        unsafe {
            let src = mapped_ptr.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(src as *const u8, data.as_mut_ptr(), data.len());
        }

        Ok(())
    }

    /// Flushes a mapped range so the GPU sees CPU writes.
    ///
    /// gpu-allocator places CPU-visible allocations in host-coherent memory,
    /// so this validates the range and returns. Pass `vk::WHOLE_SIZE` to
    /// cover the rest of the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the buffer size.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        self.check_flush_range(size, offset)
    }

    /// Invalidates a mapped range so the CPU sees GPU writes.
    ///
    /// Same coherent-memory contract as [`Buffer::flush`].
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the buffer size.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        self.check_flush_range(size, offset)
    }

    /// Returns descriptor info for a sub-range of the buffer.
    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(size)
    }

    /// Writes one instance's worth of data into slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::IndexOutOfBounds`] when `index` is outside the
    /// instance count, or any error from the underlying write.
    pub fn write_to_index(&self, data: &[u8], index: vk::DeviceSize) -> RhiResult<()> {
        self.write_to_buffer(data, self.index_offset(index)?)
    }

    /// Flushes the slot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::IndexOutOfBounds`] when `index` is outside the
    /// instance count.
    pub fn flush_index(&self, index: vk::DeviceSize) -> RhiResult<()> {
        let offset = self.index_offset(index)?;
        self.flush(self.alignment_size, offset)
    }

    /// Returns descriptor info covering exactly the slot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::IndexOutOfBounds`] when `index` is outside the
    /// instance count.
    pub fn descriptor_info_for_index(
        &self,
        index: vk::DeviceSize,
    ) -> RhiResult<vk::DescriptorBufferInfo> {
        let offset = self.index_offset(index)?;
        Ok(self.descriptor_info(self.instance_size, offset))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the total buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the unaligned size of one instance.
    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    /// Returns the stride between consecutive instances.
    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Returns the number of instance slots.
    #[inline]
    pub fn instance_count(&self) -> vk::DeviceSize {
        self.instance_count
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Returns whether the buffer is currently mapped.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Byte offset of slot `index`, bounds-checked.
    fn index_offset(&self, index: vk::DeviceSize) -> RhiResult<vk::DeviceSize> {
        if index >= self.instance_count {
            debug_assert!(false, "buffer index {index} out of bounds");
            return Err(RhiError::IndexOutOfBounds {
                index,
                count: self.instance_count,
            });
        }
        Ok(index * self.alignment_size)
    }

    fn check_range(&self, offset: vk::DeviceSize, len: vk::DeviceSize) -> RhiResult<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(RhiError::RangeOutOfBounds {
                offset,
                size: len,
                buffer_size: self.size,
            });
        }
        Ok(())
    }

    fn check_flush_range(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        if size == vk::WHOLE_SIZE {
            if offset > self.size {
                return Err(RhiError::RangeOutOfBounds {
                    offset,
                    size,
                    buffer_size: self.size,
                });
            }
            return Ok(());
        }
        self.check_range(offset, size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Free allocation first, then destroy buffer
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = match self.device.allocator().lock() {
                Ok(a) => a,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_rounds_to_next_boundary() {
        assert_eq!(align_up(68, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(1, 64), 64);
    }

    #[test]
    fn test_align_up_preserves_aligned_sizes() {
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(512, 256), 512);
        assert_eq!(align_up(0, 256), 0);
    }

    #[test]
    fn test_align_up_identity_alignment() {
        assert_eq!(align_up(68, 1), 68);
        assert_eq!(align_up(0, 1), 0);
    }

    #[test]
    fn test_align_up_result_is_multiple() {
        for size in [1u64, 7, 63, 64, 65, 200, 255, 256, 300] {
            for alignment in [1u64, 2, 16, 64, 256] {
                let aligned = align_up(size, alignment);
                assert!(aligned >= size);
                assert_eq!(aligned % alignment, 0);
                assert!(aligned < size + alignment);
            }
        }
    }

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
        assert!(
            BufferUsage::Readback
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_DST)
        );
    }

    #[test]
    fn test_buffer_usage_memory_location() {
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Storage.memory_location(),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            BufferUsage::Readback.memory_location(),
            MemoryLocation::GpuToCpu
        );
    }

    // The write path is a bounds check plus a raw copy into the mapped
    // pointer; exercise the same copy on plain memory.
    #[test]
    fn test_mock_mapping_round_trip() {
        let mut backing = vec![0u8; 64];
        let payload: [u32; 4] = [0xdead_beef, 1, 2, 3];
        let bytes: &[u8] = bytemuck::cast_slice(&payload);
        let offset = 16usize;

        unsafe {
            let dst = backing.as_mut_ptr().add(offset);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }

        assert_eq!(&backing[offset..offset + bytes.len()], bytes);
        let first: u32 =
            bytemuck::pod_read_unaligned(&backing[offset..offset + 4]);
        assert_eq!(first, 0xdead_beef);
    }
}
