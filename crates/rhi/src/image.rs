//! Owned 2D images with tracked layout.
//!
//! This module provides [`Image`], a VkImage + VkImageView + allocation
//! bundle used for depth buffers and offscreen render targets. The image
//! tracks its current `vk::ImageLayout` as the single source of truth;
//! all transitions go through [`LayoutTransition`] so the tracked state
//! and the recorded barrier can never disagree.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::image::Image;
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let depth = Image::depth_attachment(device, 1920, 1080, vk::Format::D32_SFLOAT)?;
//! let view = depth.view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info, warn};

use crate::barrier::LayoutTransition;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Owned 2D image with view, allocation, and tracked layout.
///
/// # Resource Destruction
///
/// Resources are destroyed in the following order:
/// 1. Image view
/// 2. Image
/// 3. Memory allocation
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// Vulkan image view handle.
    view: vk::ImageView,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Image format.
    format: vk::Format,
    /// Image dimensions.
    extent: vk::Extent2D,
    /// Current layout; updated by [`Image::transition`].
    layout: vk::ImageLayout,
}

impl Image {
    /// Creates a new GPU-only 2D image with the given usage and aspect.
    ///
    /// The image starts in `vk::ImageLayout::UNDEFINED`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are zero, or if image creation,
    /// allocation, or view creation fails.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &'static str,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidArgument(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let extent = vk::Extent2D { width, height };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = match device.allocator().lock() {
                Ok(a) => a,
                Err(poisoned) => poisoned.into_inner(),
            };
            match allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false, // Optimal tiling is not linear
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.handle().destroy_image(image, None) };
                    return Err(e.into());
                }
            }
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        info!("Created {} image: {}x{} ({:?})", name, width, height, format);

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format,
            extent,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    /// Creates a color attachment that can also be sampled and copied from.
    ///
    /// Used by offscreen render targets (scene color, object-id attachment).
    ///
    /// # Errors
    ///
    /// Returns an error if image creation fails.
    pub fn color_attachment(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            width,
            height,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageAspectFlags::COLOR,
            "color_attachment",
        )
    }

    /// Creates a depth attachment image.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation fails.
    pub fn depth_attachment(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            width,
            height,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            "depth_attachment",
        )
    }

    /// Records a named layout transition and updates the tracked layout.
    ///
    /// Transitions from `UNDEFINED` discard contents and are accepted from
    /// any tracked layout. Any other mismatch between the tracked layout and
    /// the transition's source layout is a programmer error: logged, debug-
    /// asserted, and still recorded so release builds keep running.
    pub fn transition(&mut self, cmd: vk::CommandBuffer, transition: LayoutTransition) {
        let from = transition.from_layout();
        if from != vk::ImageLayout::UNDEFINED && self.layout != from {
            warn!(
                "Image layout mismatch: tracked {:?}, transition expects {:?}",
                self.layout, from
            );
            debug_assert_eq!(self.layout, from, "image layout out of sync");
        }

        transition.record(self.device.handle(), cmd, self.image);
        self.layout = transition.to_layout();
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the Vulkan image view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent (width and height).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the current tracked layout.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = match self.device.allocator().lock() {
                Ok(a) => a,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free image allocation: {:?}", e);
            }
        }

        debug!(
            "Destroyed image: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}
