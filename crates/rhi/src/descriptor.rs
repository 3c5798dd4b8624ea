//! Descriptor set management for shader resource binding.
//!
//! This module provides abstractions for Vulkan descriptor management:
//! - [`DescriptorSetLayout`] defines the layout of shader bindings
//! - [`DescriptorPool`] manages allocation of descriptor sets
//! - [`DescriptorBindingBuilder`] and helper functions for common bindings
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout, DescriptorPool};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let bindings = [DescriptorBindingBuilder::uniform_buffer_dynamic(
//!     0,
//!     vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
//! )];
//! let layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
//!
//! let pool_size = vk::DescriptorPoolSize::default()
//!     .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
//!     .descriptor_count(10);
//! let pool = DescriptorPool::new(device.clone(), 10, &[pool_size])?;
//!
//! let sets = pool.allocate(&[layout.handle()])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
///
/// Defines the binding points, descriptor types, and shader stages for
/// resources bound to a shader.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a new descriptor set layout from the given bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// The pool must be created with enough capacity for all descriptor types
/// and sets that will be allocated from it.
///
/// # Thread Safety
///
/// Descriptor pool operations are not thread-safe. Synchronize access
/// externally when sharing between threads.
pub struct DescriptorPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor pool handle.
    pool: vk::DescriptorPool,
    /// Maximum number of sets that can be allocated.
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a new descriptor pool.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates descriptor sets from the pool, one per layout.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g., pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Frees descriptor sets back to the pool.
    ///
    /// The caller must ensure the descriptor sets are not in use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if freeing fails.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }

        debug!("Freed {} descriptor set(s)", sets.len());

        Ok(())
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns the maximum number of sets that can be allocated from this pool.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Updates descriptor sets with resource bindings.
///
/// The primary way to connect buffers and images to shaders.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }

    debug!("Updated {} descriptor set(s)", writes.len());
}

/// Creates a buffer info for descriptor set updates.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Builder for creating descriptor set layout bindings.
///
/// # Example
///
/// ```no_run
/// use ash::vk;
/// use ember_rhi::descriptor::DescriptorBindingBuilder;
///
/// let bindings = [DescriptorBindingBuilder::uniform_buffer_dynamic(
///     0,
///     vk::ShaderStageFlags::VERTEX,
/// )];
/// ```
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// Creates a dynamic uniform buffer binding.
    ///
    /// Dynamic uniform buffers allow specifying the buffer offset at bind
    /// time, which is how per-frame uniform slices are selected.
    #[inline]
    pub fn uniform_buffer_dynamic(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_binding_builder_dynamic_uniform_buffer() {
        let binding = DescriptorBindingBuilder::uniform_buffer_dynamic(
            0,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_buffer_info_helper() {
        let info = buffer_info(vk::Buffer::null(), 64, 128);
        assert_eq!(info.buffer, vk::Buffer::null());
        assert_eq!(info.offset, 64);
        assert_eq!(info.range, 128);
    }
}
