//! Deferred GPU object picking.
//!
//! Picking is two-phase. A mouse click calls [`Picker::request`], which only
//! records the cursor position. Once a frame whose object-id attachment
//! holds completed content comes around, [`Picker::service`] copies the one
//! pixel under the cursor into a persistent readback buffer and resolves the
//! request; [`Picker::poll`] hands the result out exactly once.
//!
//! Object id 0 is the "no object" sentinel written by the attachment clear,
//! so a miss resolves to `None`.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::barrier::LayoutTransition;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::device::Device;
use ember_scene::GameObjectId;

use crate::error::RenderResult;
use crate::target::{OffscreenTarget, RenderTarget};

/// Pure request/result queue; at most one of each.
#[derive(Debug, Default)]
pub struct PickQueue {
    pending: Option<(u32, u32)>,
    result: Option<Option<GameObjectId>>,
}

impl PickQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pick request; a newer request replaces an unserviced one.
    pub fn request(&mut self, x: u32, y: u32) {
        self.pending = Some((x, y));
    }

    /// Returns true when a request is waiting to be serviced.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the pending request, if any.
    pub fn take_pending(&mut self) -> Option<(u32, u32)> {
        self.pending.take()
    }

    /// Resolves the in-flight request with a raw object id (0 = no object).
    pub fn complete(&mut self, raw_id: u32) {
        self.result = Some(GameObjectId::from_raw(raw_id));
    }

    /// Hands out the result exactly once.
    ///
    /// Outer `Some` means a pick resolved; the inner option is the hit
    /// object, `None` for a miss.
    pub fn poll(&mut self) -> Option<Option<GameObjectId>> {
        self.result.take()
    }
}

/// Reads object ids back from an [`OffscreenTarget`]'s id attachment.
pub struct Picker {
    device: Arc<Device>,
    queue: PickQueue,
    /// Persistent one-pixel readback buffer.
    staging: Buffer,
}

impl Picker {
    /// Creates the picker and its readback buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the readback buffer cannot be created or mapped.
    pub fn new(device: Arc<Device>) -> RenderResult<Self> {
        let mut staging = Buffer::new(
            device.clone(),
            BufferUsage::Readback,
            std::mem::size_of::<u32>() as vk::DeviceSize,
            1,
            1,
        )?;
        staging.map()?;

        info!("Picker created");

        Ok(Self {
            device,
            queue: PickQueue::new(),
            staging,
        })
    }

    /// Records a pick request at window coordinates `(x, y)`.
    pub fn request(&mut self, x: u32, y: u32) {
        debug!("Pick requested at ({}, {})", x, y);
        self.queue.request(x, y);
    }

    /// Hands out a resolved pick exactly once. See [`PickQueue::poll`].
    pub fn poll(&mut self) -> Option<Option<GameObjectId>> {
        self.queue.poll()
    }

    /// Services a pending request against the given frame image.
    ///
    /// Call after the frame slot's fence has been waited, before new
    /// commands are recorded for the slot: the id attachment then holds the
    /// content rendered the last time this slot was used. Images that have
    /// never been rendered to keep the request pending.
    ///
    /// Out-of-bounds coordinates resolve to a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy submission or the readback fails.
    pub fn service(
        &mut self,
        target: &mut OffscreenTarget,
        image_index: usize,
    ) -> RenderResult<()> {
        if !self.queue.has_pending() {
            return Ok(());
        }
        if target.id_image(image_index).layout() != vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL {
            // Nothing rendered into this image yet; try again next frame.
            return Ok(());
        }
        let Some((x, y)) = self.queue.take_pending() else {
            return Ok(());
        };

        let extent = target.extent();
        if x >= extent.width || y >= extent.height {
            debug!(
                "Pick at ({}, {}) outside target {}x{}",
                x, y, extent.width, extent.height
            );
            self.queue.complete(0);
            return Ok(());
        }

        let cmd = self.device.begin_single_time_commands()?;

        target
            .id_image_mut(image_index)
            .transition(cmd, LayoutTransition::ColorToTransferSrc);

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D {
                x: x as i32,
                y: y as i32,
                z: 0,
            })
            .image_extent(vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            });

        unsafe {
            self.device.handle().cmd_copy_image_to_buffer(
                cmd,
                target.id_image(image_index).handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.staging.handle(),
                &[region],
            );
        }

        target
            .id_image_mut(image_index)
            .transition(cmd, LayoutTransition::TransferSrcToShaderRead);

        // Waits on the transfer, so the staging buffer holds the pixel.
        self.device.end_single_time_commands(cmd)?;

        self.staging.invalidate(vk::WHOLE_SIZE, 0)?;
        let mut bytes = [0u8; 4];
        self.staging.read_from_buffer(&mut bytes, 0)?;
        let raw_id = u32::from_ne_bytes(bytes);

        debug!("Pick at ({}, {}) resolved to id {}", x, y, raw_id);
        self.queue.complete(raw_id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_handed_out_once() {
        let mut queue = PickQueue::new();
        queue.request(10, 20);
        assert_eq!(queue.take_pending(), Some((10, 20)));

        queue.complete(7);
        let hit = queue.poll().unwrap();
        assert_eq!(hit, GameObjectId::from_raw(7));
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_zero_id_resolves_to_miss() {
        let mut queue = PickQueue::new();
        queue.request(0, 0);
        queue.take_pending();
        queue.complete(0);

        assert_eq!(queue.poll(), Some(None));
    }

    #[test]
    fn test_newer_request_replaces_older() {
        let mut queue = PickQueue::new();
        queue.request(1, 1);
        queue.request(2, 2);

        assert_eq!(queue.take_pending(), Some((2, 2)));
        assert_eq!(queue.take_pending(), None);
    }

    #[test]
    fn test_empty_queue_has_nothing() {
        let mut queue = PickQueue::new();
        assert!(!queue.has_pending());
        assert!(queue.take_pending().is_none());
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_offscreen_target_extent_reachable_through_trait() {
        // service() reads the extent via the RenderTarget trait; keep the
        // bound visible here so the impl is checked without a device.
        fn assert_render_target<T: RenderTarget>() {}
        assert_render_target::<OffscreenTarget>();
    }
}
