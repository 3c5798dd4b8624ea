//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and
//! presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] struct provides a safe abstraction over the Vulkan
//! swapchain, including:
//! - Surface capability querying
//! - Format and present mode selection
//! - Image view creation and management
//! - Recreation on resize, with format stability verification
//!
//! `acquire_next_image` and `present` return the raw `vk::Result` so the
//! frame loop can react to `ERROR_OUT_OF_DATE_KHR` and `SUBOPTIMAL_KHR`
//! itself; the swapchain makes no recreation decisions on its own.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations).
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, ...).
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain wrapper.
///
/// Manages the swapchain handle, its images (owned by the swapchain) and the
/// image views created for them.
///
/// # Thread Safety
///
/// The swapchain is not thread-safe. Only one thread should interact with it
/// at a time.
pub struct Swapchain {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Swapchain extension loader.
    swapchain_loader: ash::khr::swapchain::Device,
    /// Swapchain handle.
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain).
    images: Vec<vk::Image>,
    /// Image views for the swapchain images.
    image_views: Vec<vk::ImageView>,
    /// Swapchain image format.
    format: vk::Format,
    /// Swapchain color space.
    color_space: vk::ColorSpaceKHR,
    /// Swapchain extent (resolution).
    extent: vk::Extent2D,
    /// Present mode.
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a new swapchain.
    ///
    /// Selection policy:
    /// - Preferred format: B8G8R8A8_SRGB with SRGB_NONLINEAR color space
    /// - Preferred present mode: MAILBOX, fallback to FIFO (always available)
    /// - Image count: minimum + 1, capped by the surface maximum
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, support is inadequate, or
    /// swapchain / image view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        Self::create_internal(
            instance,
            device,
            surface,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    fn create_internal(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let swapchain_loader =
            ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let queue_families = device.queue_families();
        let graphics_family = queue_families.graphics_family.ok_or_else(|| {
            RhiError::SwapchainError("Device has no graphics queue family".to_string())
        })?;
        let present_family = queue_families.present_family.ok_or_else(|| {
            RhiError::SwapchainError("Device has no present queue family".to_string())
        })?;
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            debug!("Using EXCLUSIVE sharing mode (same queue family for graphics and present)");
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        info!("Swapchain created with {} images", images.len());

        let image_views = create_image_views(&device, &images, surface_format.format)?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
        })
    }

    /// Recreates the swapchain for a new window size.
    ///
    /// Waits for the device to go idle, passes the old swapchain handle to
    /// the presentation engine for resource reuse, then verifies the newly
    /// negotiated color format matches the old one. Pipelines and descriptor
    /// sets are built against the original format; a format change cannot be
    /// absorbed here.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FormatChanged`] if the surface negotiated a
    /// different color format, or any error from swapchain creation.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!("Recreating swapchain for new size: {}x{}", width, height);

        // Image views go first; the images themselves belong to the swapchain.
        self.destroy_image_views();

        let old_swapchain = self.swapchain;
        let mut new_swapchain = Self::create_internal(
            instance,
            self.device.clone(),
            surface,
            width,
            height,
            old_swapchain,
        )?;

        if let Err(e) = check_format_unchanged(self.format, new_swapchain.format) {
            // new_swapchain drops here and cleans up its own handle; the old
            // handle is still owned by self, so Drop destroys it exactly once.
            return Err(e);
        }

        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }

        self.swapchain = new_swapchain.swapchain;
        self.images = std::mem::take(&mut new_swapchain.images);
        self.image_views = std::mem::take(&mut new_swapchain.image_views);
        self.color_space = new_swapchain.color_space;
        self.extent = new_swapchain.extent;
        self.present_mode = new_swapchain.present_mode;

        // Prevent double-free when new_swapchain drops.
        new_swapchain.swapchain = vk::SwapchainKHR::null();

        Ok(())
    }

    /// Acquires the next swapchain image for rendering.
    ///
    /// Returns `(image_index, suboptimal)`. The raw `vk::Result` error is
    /// passed through so the caller can handle `ERROR_OUT_OF_DATE_KHR` by
    /// recreating the swapchain.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents the rendered image to the screen.
    ///
    /// Returns true if the swapchain is suboptimal and should be recreated.
    /// The raw `vk::Result` error is passed through, including
    /// `ERROR_OUT_OF_DATE_KHR`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        // Null handle means recreate() already moved ownership elsewhere.
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }

            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Chooses the best surface format from the available formats.
///
/// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR, then B8G8R8A8_UNORM, then the
/// first available format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return format;
    }

    let alternative = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = alternative {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return format;
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// Chooses the best present mode from the available modes.
///
/// Prefers MAILBOX (no tearing, low latency). Falls back to FIFO, which the
/// surface is required to support.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode (triple buffering)");
        return vk::PresentModeKHR::MAILBOX;
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the surface reports a fixed current extent, use it. Otherwise clamp the
/// requested size to the surface's min/max extents.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    extent
}

/// Verifies the recreated swapchain negotiated the same color format.
///
/// Pipelines and descriptor sets are built against the original format, so a
/// change cannot be absorbed by recreation and must abort it.
fn check_format_unchanged(old: vk::Format, new: vk::Format) -> RhiResult<()> {
    if new != old {
        return Err(RhiError::FormatChanged { old, new });
    }
    Ok(())
}

/// Determines the number of swapchain images.
///
/// Prefers one more than the minimum, capped by the maximum when one is set
/// (a maximum of 0 means unlimited).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Creates image views for swapchain images.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = unsafe {
            device
                .handle()
                .create_image_view(&create_info, None)
                .map_err(|e| {
                    RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
                })?
        };

        image_views.push(image_view);
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];

        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 2000);

        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!(extent.width, 100);
        assert_eq!(extent.height, 100);

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 3);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 3);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!no_formats.is_adequate());

        let no_modes = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![],
        };
        assert!(!no_modes.is_adequate());
    }

    #[test]
    fn test_check_format_unchanged() {
        assert!(check_format_unchanged(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::B8G8R8A8_SRGB
        )
        .is_ok());

        let err = check_format_unchanged(vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM)
            .unwrap_err();
        assert!(matches!(
            err,
            RhiError::FormatChanged {
                old: vk::Format::B8G8R8A8_SRGB,
                new: vk::Format::B8G8R8A8_UNORM,
            }
        ));
    }
}
