//! Render target abstraction.
//!
//! A [`RenderTarget`] is something a renderer can draw into: it knows its
//! attachments, performs the layout transitions around a dynamic rendering
//! pass, and handles resizing. Two implementations exist:
//!
//! - [`SwapchainTarget`]: the window surface, one depth image per swapchain
//!   image, final layout `PRESENT_SRC_KHR`.
//! - [`OffscreenTarget`]: sampled color plus an `R32_UINT` object-id
//!   attachment used for picking, final layout `SHADER_READ_ONLY_OPTIMAL`.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::barrier::LayoutTransition;
use ember_rhi::command::CommandBuffer;
use ember_rhi::device::Device;
use ember_rhi::image::Image;
use ember_rhi::instance::Instance;
use ember_rhi::swapchain::Swapchain;

use crate::error::RenderResult;
use crate::MAX_FRAMES_IN_FLIGHT;

/// Format of the offscreen color attachment.
pub const OFFSCREEN_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Format of the object-id attachment. One `u32` id per pixel; 0 means
/// "no object".
pub const OBJECT_ID_FORMAT: vk::Format = vk::Format::R32_UINT;

/// What a target should do in response to a reported window extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeAction {
    /// Extent is unchanged or degenerate; keep the current resources.
    Keep,
    /// Rebuild the target's resources for the new extent.
    Recreate,
}

/// Pure resize predicate shared by all targets.
///
/// Equal extents are a no-op, and so are zero-width or zero-height extents
/// (a minimized window); the frame is skipped instead.
pub fn resize_action(current: vk::Extent2D, new: vk::Extent2D) -> ResizeAction {
    if new.width == 0 || new.height == 0 {
        return ResizeAction::Keep;
    }
    if new.width == current.width && new.height == current.height {
        return ResizeAction::Keep;
    }
    ResizeAction::Recreate
}

/// A surface renderers draw into.
pub trait RenderTarget {
    /// Current extent of the target.
    fn extent(&self) -> vk::Extent2D;

    /// Number of images the target cycles through.
    fn image_count(&self) -> usize;

    /// Number of color attachments per image (1 swapchain, 2 offscreen).
    fn color_attachment_count(&self) -> usize;

    /// Color attachment formats, in attachment order.
    fn color_formats(&self) -> Vec<vk::Format>;

    /// Depth attachment format.
    fn depth_format(&self) -> vk::Format;

    /// Transitions the attachments and begins a dynamic rendering pass on
    /// image `image_index`.
    fn begin_rendering(&mut self, cmd: &CommandBuffer, image_index: usize);

    /// Ends the pass and transitions the attachments to their final layout.
    fn end_rendering(&mut self, cmd: &CommandBuffer, image_index: usize);

    /// Reacts to a new window extent per [`resize_action`].
    fn on_resize(&mut self, extent: vk::Extent2D) -> RenderResult<()>;
}

/// The window swapchain plus one depth image per swapchain image.
pub struct SwapchainTarget {
    instance: Arc<Instance>,
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    swapchain: Swapchain,
    depth_images: Vec<Image>,
    depth_format: vk::Format,
}

impl SwapchainTarget {
    /// Creates the swapchain and its depth images.
    ///
    /// # Errors
    ///
    /// Returns an error if swapchain, depth format query, or depth image
    /// creation fails.
    pub fn new(
        instance: Arc<Instance>,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let swapchain = Swapchain::new(&instance, device.clone(), surface, width, height)?;
        let depth_format = device.find_depth_format(instance.handle())?;
        let depth_images = Self::create_depth_images(&device, &swapchain, depth_format)?;

        info!(
            "Swapchain target created: {}x{}, {} images, depth {:?}",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count(),
            depth_format
        );

        Ok(Self {
            instance,
            device,
            surface,
            swapchain,
            depth_images,
            depth_format,
        })
    }

    fn create_depth_images(
        device: &Arc<Device>,
        swapchain: &Swapchain,
        depth_format: vk::Format,
    ) -> RenderResult<Vec<Image>> {
        let extent = swapchain.extent();
        let mut depth_images = Vec::with_capacity(swapchain.image_count() as usize);
        for _ in 0..swapchain.image_count() {
            depth_images.push(Image::depth_attachment(
                device.clone(),
                extent.width,
                extent.height,
                depth_format,
            )?);
        }
        Ok(depth_images)
    }

    /// Returns the underlying swapchain.
    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Unconditionally recreates the swapchain and depth images.
    ///
    /// Used when acquire or present reported the swapchain out of date even
    /// though the window extent is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if recreation fails or the surface format changed.
    pub fn rebuild(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.swapchain
            .recreate(&self.instance, self.surface, extent.width, extent.height)?;
        self.depth_images =
            Self::create_depth_images(&self.device, &self.swapchain, self.depth_format)?;

        debug!(
            "Swapchain target rebuilt at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );

        Ok(())
    }
}

impl RenderTarget for SwapchainTarget {
    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count() as usize
    }

    fn color_attachment_count(&self) -> usize {
        1
    }

    fn color_formats(&self) -> Vec<vk::Format> {
        vec![self.swapchain.format()]
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    fn begin_rendering(&mut self, cmd: &CommandBuffer, image_index: usize) {
        let extent = self.swapchain.extent();

        // Swapchain images are not layout-tracked; contents are discarded
        // and cleared every frame, so an UNDEFINED source is always valid.
        LayoutTransition::UndefinedToColor.record(
            self.device.handle(),
            cmd.handle(),
            self.swapchain.image(image_index),
        );
        self.depth_images[image_index].transition(cmd.handle(), LayoutTransition::UndefinedToDepth);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.image_view(image_index))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.05, 0.05, 0.08, 1.0],
                },
            });

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_images[image_index].view())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);
    }

    fn end_rendering(&mut self, cmd: &CommandBuffer, image_index: usize) {
        cmd.end_rendering();
        LayoutTransition::ColorToPresent.record(
            self.device.handle(),
            cmd.handle(),
            self.swapchain.image(image_index),
        );
    }

    fn on_resize(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        if resize_action(self.swapchain.extent(), extent) == ResizeAction::Keep {
            return Ok(());
        }
        self.rebuild(extent)
    }
}

/// Offscreen target with a sampled color attachment and an object-id
/// attachment, [`MAX_FRAMES_IN_FLIGHT`] images deep.
pub struct OffscreenTarget {
    device: Arc<Device>,
    extent: vk::Extent2D,
    color_images: Vec<Image>,
    id_images: Vec<Image>,
    depth_images: Vec<Image>,
    sampler: vk::Sampler,
    depth_format: vk::Format,
}

impl OffscreenTarget {
    /// Creates the offscreen images and the shared sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if image or sampler creation fails.
    pub fn new(
        device: Arc<Device>,
        depth_format: vk::Format,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let extent = vk::Extent2D { width, height };
        let (color_images, id_images, depth_images) =
            Self::create_images(&device, extent, depth_format)?;

        // Swapchain images are never sampled; offscreen color is, so the
        // target owns the one sampler its consumers share.
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        let sampler = unsafe { device.handle().create_sampler(&sampler_info, None) }
            .map_err(ember_rhi::RhiError::from)?;

        info!(
            "Offscreen target created: {}x{}, {} images",
            width, height, MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            extent,
            color_images,
            id_images,
            depth_images,
            sampler,
            depth_format,
        })
    }

    fn create_images(
        device: &Arc<Device>,
        extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> RenderResult<(Vec<Image>, Vec<Image>, Vec<Image>)> {
        let mut color_images = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut id_images = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut depth_images = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            color_images.push(Image::color_attachment(
                device.clone(),
                extent.width,
                extent.height,
                OFFSCREEN_COLOR_FORMAT,
            )?);
            id_images.push(Image::color_attachment(
                device.clone(),
                extent.width,
                extent.height,
                OBJECT_ID_FORMAT,
            )?);
            depth_images.push(Image::depth_attachment(
                device.clone(),
                extent.width,
                extent.height,
                depth_format,
            )?);
        }

        Ok((color_images, id_images, depth_images))
    }

    /// Returns the object-id image for the given frame image.
    #[inline]
    pub fn id_image(&self, image_index: usize) -> &Image {
        &self.id_images[image_index]
    }

    /// Mutable access to the object-id image (the picker transitions it).
    #[inline]
    pub fn id_image_mut(&mut self, image_index: usize) -> &mut Image {
        &mut self.id_images[image_index]
    }

    /// Returns the sampled color image for the given frame image.
    #[inline]
    pub fn color_image(&self, image_index: usize) -> &Image {
        &self.color_images[image_index]
    }

    /// Returns the shared sampler for the color images.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl RenderTarget for OffscreenTarget {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn image_count(&self) -> usize {
        MAX_FRAMES_IN_FLIGHT
    }

    fn color_attachment_count(&self) -> usize {
        2
    }

    fn color_formats(&self) -> Vec<vk::Format> {
        vec![OFFSCREEN_COLOR_FORMAT, OBJECT_ID_FORMAT]
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    fn begin_rendering(&mut self, cmd: &CommandBuffer, image_index: usize) {
        // All attachments are cleared, so UNDEFINED sources discard whatever
        // the previous frame (or the picker) left behind.
        self.color_images[image_index].transition(cmd.handle(), LayoutTransition::UndefinedToColor);
        self.id_images[image_index].transition(cmd.handle(), LayoutTransition::UndefinedToColor);
        self.depth_images[image_index].transition(cmd.handle(), LayoutTransition::UndefinedToDepth);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.color_images[image_index].view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            });

        // Integer attachment: id 0 is the "no object" sentinel.
        let id_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.id_images[image_index].view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { uint32: [0, 0, 0, 0] },
            });

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_images[image_index].view())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let color_attachments = [color_attachment, id_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);
    }

    fn end_rendering(&mut self, cmd: &CommandBuffer, image_index: usize) {
        cmd.end_rendering();
        // The color image goes to sampling; the id image stays a color
        // attachment so the picker can transition it for readback.
        self.color_images[image_index]
            .transition(cmd.handle(), LayoutTransition::ColorToShaderRead);
    }

    fn on_resize(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        if resize_action(self.extent, extent) == ResizeAction::Keep {
            return Ok(());
        }

        self.device.wait_idle()?;

        // Wholesale rebuild; the old images drop here.
        let (color_images, id_images, depth_images) =
            Self::create_images(&self.device, extent, self.depth_format)?;
        self.color_images = color_images;
        self.id_images = id_images;
        self.depth_images = depth_images;
        self.extent = extent;

        debug!(
            "Offscreen target resized to {}x{}",
            extent.width, extent.height
        );

        Ok(())
    }
}

impl Drop for OffscreenTarget {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Offscreen target destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_resize_action_equal_extent_is_noop() {
        assert_eq!(
            resize_action(extent(800, 600), extent(800, 600)),
            ResizeAction::Keep
        );
    }

    #[test]
    fn test_resize_action_zero_extent_is_noop() {
        // Minimized window: both dimensions and each alone.
        assert_eq!(
            resize_action(extent(800, 600), extent(0, 0)),
            ResizeAction::Keep
        );
        assert_eq!(
            resize_action(extent(800, 600), extent(0, 600)),
            ResizeAction::Keep
        );
        assert_eq!(
            resize_action(extent(800, 600), extent(800, 0)),
            ResizeAction::Keep
        );
    }

    #[test]
    fn test_resize_action_new_extent_recreates() {
        assert_eq!(
            resize_action(extent(800, 600), extent(1920, 1080)),
            ResizeAction::Recreate
        );
        assert_eq!(
            resize_action(extent(800, 600), extent(800, 601)),
            ResizeAction::Recreate
        );
    }
}
