//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, gpu-allocator
//! initialization, and one-shot command submission for the setup path.
//!
//! # Overview
//!
//! The [`Device`] struct provides a safe abstraction over the Vulkan logical
//! device, including:
//! - Logical device creation with required extensions and features
//! - Queue retrieval for graphics and presentation
//! - Memory allocation via gpu-allocator
//! - Single-time command buffers for uploads and layout transitions
//! - Format capability queries
//!
//! There is exactly one `Arc<Device>` per process. It is created at the
//! composition root and handed to every resource that needs it; there is no
//! global accessor.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//! use ember_rhi::physical_device::select_physical_device;
//! use ember_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//!
//! let graphics_queue = device.graphics_queue();
//! ```

use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] =
    &[ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Vulkan logical device wrapper.
///
/// Owns the logical device, its queues, the memory allocator, and a transient
/// command pool for one-shot submissions.
///
/// # Thread Safety
///
/// The [`Device`] is shared across the engine via `Arc`. The allocator is
/// protected by a `Mutex`. Single-time commands use a dedicated fence and are
/// reserved for the setup path on the main thread.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Cached physical device properties (limits, alignment requirements).
    properties: vk::PhysicalDeviceProperties,
    /// GPU memory allocator (thread-safe via Mutex).
    allocator: Mutex<Allocator>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
    /// Long-lived pool for transient command buffers.
    transient_pool: vk::CommandPool,
    /// Fence used to wait for single-time submissions.
    single_submit_fence: vk::Fence,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// Enables the swapchain and dynamic rendering extensions, the Vulkan 1.3
    /// dynamic rendering and synchronization2 features, and initializes the
    /// gpu-allocator for memory management.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = &physical_device_info.queue_families;

        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families
            .present_family
            .ok_or(RhiError::NoSuitableGpu)?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let features = vk::PhysicalDeviceFeatures::default().fill_mode_non_solid(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        debug!("Graphics queue retrieved from family {}", graphics_family);

        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!("Present queue retrieved from family {}", present_family);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        // Pool for one-shot command buffers (uploads, layout transitions).
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(graphics_family);
        let transient_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let fence_info = vk::FenceCreateInfo::default();
        let single_submit_fence = unsafe { device.create_fence(&fence_info, None)? };

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: Mutex::new(allocator),
            graphics_queue,
            present_queue,
            queue_families: physical_device_info.queue_families,
            transient_pool,
            single_submit_fence,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns a reference to the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Minimum alignment for dynamic uniform buffer offsets, in bytes.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Begins a one-shot command buffer on the transient pool.
    ///
    /// Setup-path only: the matching [`Device::end_single_time_commands`]
    /// blocks until the GPU finishes, so this must never be used inside the
    /// frame loop.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or recording setup fails.
    pub fn begin_single_time_commands(&self) -> Result<vk::CommandBuffer, RhiError> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.transient_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info)?[0] };

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)?;
        }

        Ok(command_buffer)
    }

    /// Ends, submits, and waits for a one-shot command buffer.
    ///
    /// Submits to the graphics queue, waits on the dedicated single-submit
    /// fence, resets the fence, and frees the command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if submission or the fence wait fails.
    pub fn end_single_time_commands(&self, command_buffer: vk::CommandBuffer) -> Result<(), RhiError> {
        unsafe {
            self.device.end_command_buffer(command_buffer)?;

            let buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&buffers);
            self.device.queue_submit(
                self.graphics_queue,
                &[submit_info],
                self.single_submit_fence,
            )?;

            self.device
                .wait_for_fences(&[self.single_submit_fence], true, u64::MAX)?;
            self.device.reset_fences(&[self.single_submit_fence])?;

            self.device
                .free_command_buffers(self.transient_pool, &buffers);
        }

        Ok(())
    }

    /// Finds the first format among `candidates` supported with the given
    /// tiling and feature flags.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FormatNotSupported`] when no candidate matches.
    pub fn find_supported_format(
        &self,
        instance: &ash::Instance,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format, RhiError> {
        for &format in candidates {
            let props =
                unsafe { instance.get_physical_device_format_properties(self.physical_device, format) };

            let supported = match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            };

            if supported {
                return Ok(format);
            }
        }

        Err(RhiError::FormatNotSupported(format!("{candidates:?}")))
    }

    /// Finds a depth attachment format supported by this device.
    ///
    /// Prefers `D32_SFLOAT`, falling back to combined depth-stencil formats.
    pub fn find_depth_format(&self, instance: &ash::Instance) -> Result<vk::Format, RhiError> {
        self.find_supported_format(
            instance,
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Waits for the device to become idle.
    ///
    /// Blocks until all outstanding operations on all queues have completed.
    /// Used before destroying resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure all command buffers are valid and recorded,
    /// synchronization is properly handled, and the fence is not in use.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            self.device.destroy_fence(self.single_submit_fence, None);
            self.device.destroy_command_pool(self.transient_pool, None);

            // The allocator is dropped with the Mutex; all allocations must
            // already be freed at this point.

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, the raw Vulkan handles are Copy, and the
// allocator is protected by a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::dynamic_rendering::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
