//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::sync::{Semaphore, Fence};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//!
//! // Signaled initially so the first frame does not block.
//! let in_flight_fence = Fence::new(device.clone(), true)?;
//! in_flight_fence.wait(u64::MAX)?;
//! in_flight_fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Semaphores are used for GPU-to-GPU synchronization between queue
/// operations, e.g. image-available and render-finished signaling around
/// a swapchain image.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// Fences are used for GPU-to-CPU synchronization, allowing the host to wait
/// for GPU operations to complete before reusing per-frame resources.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// Pass `signaled = true` for fences that are waited on before the first
    /// GPU operation that would signal them.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// Blocks until the fence is signaled or `timeout` (in nanoseconds)
    /// expires. Use `u64::MAX` for an infinite wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait times out or fails.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any queue operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Checks if the fence is currently signaled, without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
