//! Per-frame uniform slice distribution.
//!
//! [`RenderContext`] owns one mapped uniform buffer per [`ResourceKind`],
//! carved into `MAX_FRAMES_IN_FLIGHT * slice_capacity` aligned slices. Each
//! registered renderer gets a [`SliceIndex`]; at draw time the renderer's
//! slice is selected with a dynamic descriptor offset instead of a separate
//! buffer or descriptor set per renderer.
//!
//! Layout of one kind's buffer (frames outermost):
//!
//! ```text
//! | frame 0: slice 0 | slice 1 | ... | frame 1: slice 0 | slice 1 | ... |
//! ```
//!
//! Writes for a frame go through a [`FrameWriter`] obtained from
//! [`RenderContext::begin_frame`]; the render system only constructs one
//! after the frame slot's fence has been waited, so a writer never touches
//! memory the GPU is still reading.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::buffer::{align_up, Buffer, BufferUsage};
use ember_rhi::descriptor::{
    buffer_info, update_descriptor_sets, DescriptorBindingBuilder, DescriptorPool,
    DescriptorSetLayout,
};
use ember_rhi::device::Device;

use crate::error::{RenderError, RenderResult};
use crate::ubo::{CameraData, PointLightData};
use crate::MAX_FRAMES_IN_FLIGHT;

/// The closed set of uniform resources the context distributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// Per-renderer camera data ([`CameraData`]).
    Camera,
    /// Per-renderer point light data ([`PointLightData`]).
    PointLight,
}

impl ResourceKind {
    /// All kinds, in buffer order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Camera, ResourceKind::PointLight];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Camera => "camera",
            ResourceKind::PointLight => "point light",
        }
    }

    /// Unaligned size of one slice of this kind.
    pub fn data_size(self) -> vk::DeviceSize {
        match self {
            ResourceKind::Camera => CameraData::SIZE as vk::DeviceSize,
            ResourceKind::PointLight => PointLightData::SIZE as vk::DeviceSize,
        }
    }

    fn index(self) -> usize {
        match self {
            ResourceKind::Camera => 0,
            ResourceKind::PointLight => 1,
        }
    }
}

/// A renderer's slot within each kind's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceIndex(u32);

impl SliceIndex {
    /// Returns the raw slice number.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Pure offset arithmetic for one kind's slice grid.
#[derive(Clone, Copy, Debug)]
pub struct SliceLayout {
    slice_size: vk::DeviceSize,
    slice_capacity: u32,
}

impl SliceLayout {
    /// Builds a layout with the slice stride rounded up to `alignment`.
    pub fn new(data_size: vk::DeviceSize, alignment: vk::DeviceSize, slice_capacity: u32) -> Self {
        Self {
            slice_size: align_up(data_size, alignment.max(1)),
            slice_capacity,
        }
    }

    /// Aligned stride of one slice.
    #[inline]
    pub fn slice_size(&self) -> vk::DeviceSize {
        self.slice_size
    }

    /// Byte offset where a frame's slice block starts.
    #[inline]
    pub fn frame_base(&self, frame: usize) -> vk::DeviceSize {
        frame as vk::DeviceSize * self.slice_size * self.slice_capacity as vk::DeviceSize
    }

    /// Byte offset of one slice within the whole buffer.
    #[inline]
    pub fn offset(&self, frame: usize, slice: u32) -> vk::DeviceSize {
        self.frame_base(frame) + slice as vk::DeviceSize * self.slice_size
    }

    /// Bind-time dynamic offset of a slice, relative to the frame base the
    /// descriptor set was written with.
    #[inline]
    pub fn dynamic_offset(&self, slice: u32) -> u32 {
        (slice as vk::DeviceSize * self.slice_size) as u32
    }

    /// Total buffer size covering all frames and slices.
    #[inline]
    pub fn total_size(&self) -> vk::DeviceSize {
        self.frame_base(MAX_FRAMES_IN_FLIGHT)
    }
}

struct KindState {
    buffer: Buffer,
    layout: SliceLayout,
    /// One set per frame in flight, allocated lazily and exactly once.
    sets: Option<Vec<vk::DescriptorSet>>,
}

/// Distributes per-frame uniform slices to registered renderers.
pub struct RenderContext {
    device: Arc<Device>,
    set_layout: DescriptorSetLayout,
    pool: DescriptorPool,
    kinds: Vec<KindState>,
    slice_capacity: u32,
    next_slice: u32,
}

impl RenderContext {
    /// Creates the uniform buffers and descriptor pool for `slice_capacity`
    /// renderers.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer, layout, or pool creation fails.
    pub fn new(device: Arc<Device>, slice_capacity: u32) -> RenderResult<Self> {
        let alignment = device.min_uniform_buffer_offset_alignment();

        let bindings = [DescriptorBindingBuilder::uniform_buffer_dynamic(
            0,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let max_sets = (ResourceKind::ALL.len() * MAX_FRAMES_IN_FLIGHT) as u32;
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(max_sets)];
        let pool = DescriptorPool::new(device.clone(), max_sets, &pool_sizes)?;

        let mut kinds = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            let layout = SliceLayout::new(kind.data_size(), alignment, slice_capacity);
            let slot_count = (MAX_FRAMES_IN_FLIGHT as u32 * slice_capacity) as vk::DeviceSize;
            let mut buffer = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                kind.data_size(),
                slot_count,
                alignment,
            )?;
            debug_assert_eq!(buffer.alignment_size(), layout.slice_size());
            buffer.map()?;

            debug!(
                "Created {} uniform buffer: {} slices x {} frames, stride {}",
                kind.name(),
                slice_capacity,
                MAX_FRAMES_IN_FLIGHT,
                layout.slice_size()
            );

            kinds.push(KindState {
                buffer,
                layout,
                sets: None,
            });
        }

        info!(
            "Render context created: {} renderer slices per kind",
            slice_capacity
        );

        Ok(Self {
            device,
            set_layout,
            pool,
            kinds,
            slice_capacity,
            next_slice: 0,
        })
    }

    /// Hands out the next renderer slice.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SliceCapacityExceeded`] when all slices are
    /// taken.
    pub fn register_renderer(&mut self) -> RenderResult<SliceIndex> {
        if self.next_slice >= self.slice_capacity {
            return Err(RenderError::SliceCapacityExceeded {
                capacity: self.slice_capacity,
            });
        }
        let slice = SliceIndex(self.next_slice);
        self.next_slice += 1;
        debug!("Registered renderer slice {}", slice.get());
        Ok(slice)
    }

    /// Allocates and writes the per-frame descriptor sets for `kind`.
    ///
    /// Idempotent: a second call for the same kind is a no-op. Each frame's
    /// set is bound at that frame's base offset with a range of one slice;
    /// the slice within the frame is selected at bind time with
    /// [`RenderContext::dynamic_offset`].
    ///
    /// # Errors
    ///
    /// Returns an error if set allocation fails.
    pub fn create_descriptor_sets(&mut self, kind: ResourceKind) -> RenderResult<()> {
        let state = &mut self.kinds[kind.index()];
        if state.sets.is_some() {
            return Ok(());
        }

        let layouts = vec![self.set_layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let sets = self.pool.allocate(&layouts)?;

        for (frame, set) in sets.iter().enumerate() {
            let info = [buffer_info(
                state.buffer.handle(),
                state.layout.frame_base(frame),
                state.layout.slice_size(),
            )];
            let write = vk::WriteDescriptorSet::default()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(&info);
            update_descriptor_sets(&self.device, &[write]);
        }

        debug!("Created descriptor sets for {} resource", kind.name());
        state.sets = Some(sets);
        Ok(())
    }

    /// Returns the descriptor set for `kind` at `frame_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame index is out of range or
    /// [`RenderContext::create_descriptor_sets`] was never called for the
    /// kind.
    pub fn descriptor_set(
        &self,
        kind: ResourceKind,
        frame_index: usize,
    ) -> RenderResult<vk::DescriptorSet> {
        self.check_frame(frame_index)?;
        let state = &self.kinds[kind.index()];
        let sets = state
            .sets
            .as_ref()
            .ok_or(RenderError::DescriptorSetsMissing { kind: kind.name() })?;
        Ok(sets[frame_index])
    }

    /// Returns the bind-time dynamic offset selecting `slice` for `kind`.
    #[inline]
    pub fn dynamic_offset(&self, kind: ResourceKind, slice: SliceIndex) -> u32 {
        self.kinds[kind.index()].layout.dynamic_offset(slice.get())
    }

    /// Returns the descriptor set layout shared by all kinds.
    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    /// Starts writing uniform data for `frame_index`.
    ///
    /// Call only after the frame slot's fence has been waited; the returned
    /// writer is the sole path to slice memory, which keeps writes off
    /// frames the GPU still owns.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::FrameOutOfRange`] for a bad frame index.
    pub fn begin_frame(&mut self, frame_index: usize) -> RenderResult<FrameWriter<'_>> {
        self.check_frame(frame_index)?;
        Ok(FrameWriter {
            ctx: self,
            frame_index,
        })
    }

    fn check_frame(&self, frame_index: usize) -> RenderResult<()> {
        if frame_index >= MAX_FRAMES_IN_FLIGHT {
            debug_assert!(false, "frame index {frame_index} out of range");
            return Err(RenderError::FrameOutOfRange {
                frame: frame_index,
                max: MAX_FRAMES_IN_FLIGHT,
            });
        }
        Ok(())
    }

    fn write_slice(
        &self,
        kind: ResourceKind,
        frame_index: usize,
        slice: SliceIndex,
        bytes: &[u8],
    ) -> RenderResult<()> {
        if slice.get() >= self.slice_capacity {
            debug_assert!(false, "slice {} out of range", slice.get());
            return Err(RenderError::SliceOutOfRange {
                slice: slice.get(),
                capacity: self.slice_capacity,
            });
        }

        let state = &self.kinds[kind.index()];
        let offset = state.layout.offset(frame_index, slice.get());
        state.buffer.write_to_buffer(bytes, offset)?;
        state.buffer.flush(state.layout.slice_size(), offset)?;
        Ok(())
    }
}

/// Write access to one frame's uniform slices.
///
/// Obtained from [`RenderContext::begin_frame`]; holds the context mutably
/// so nothing else can hand out writes for a different frame concurrently.
pub struct FrameWriter<'a> {
    ctx: &'a mut RenderContext,
    frame_index: usize,
}

impl FrameWriter<'_> {
    /// The frame this writer targets.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Writes `bytes` into the given kind's slice for this frame.
    ///
    /// # Errors
    ///
    /// Returns an error for an out-of-range slice or a write past the slice
    /// grid.
    pub fn write(
        &mut self,
        kind: ResourceKind,
        slice: SliceIndex,
        bytes: &[u8],
    ) -> RenderResult<()> {
        self.ctx.write_slice(kind, self.frame_index, slice, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_stride_is_aligned() {
        let layout = SliceLayout::new(208, 256, 4);
        assert_eq!(layout.slice_size(), 256);

        let layout = SliceLayout::new(256, 256, 4);
        assert_eq!(layout.slice_size(), 256);

        let layout = SliceLayout::new(257, 256, 4);
        assert_eq!(layout.slice_size(), 512);
    }

    #[test]
    fn test_slice_offsets_never_overlap() {
        let capacity = 4;
        let layout = SliceLayout::new(208, 256, capacity);

        let mut ranges = Vec::new();
        for frame in 0..MAX_FRAMES_IN_FLIGHT {
            for slice in 0..capacity {
                let start = layout.offset(frame, slice);
                ranges.push((start, start + layout.slice_size()));
            }
        }

        for (i, &(a_start, a_end)) in ranges.iter().enumerate() {
            for &(b_start, b_end) in &ranges[i + 1..] {
                assert!(
                    a_end <= b_start || b_end <= a_start,
                    "ranges [{a_start}, {a_end}) and [{b_start}, {b_end}) overlap"
                );
            }
        }
    }

    #[test]
    fn test_offset_decomposes_into_base_plus_dynamic() {
        let layout = SliceLayout::new(32, 64, 8);
        for frame in 0..MAX_FRAMES_IN_FLIGHT {
            for slice in 0..8 {
                assert_eq!(
                    layout.offset(frame, slice),
                    layout.frame_base(frame) + layout.dynamic_offset(slice) as vk::DeviceSize
                );
            }
        }
    }

    #[test]
    fn test_total_size_covers_all_slices() {
        let layout = SliceLayout::new(208, 256, 4);
        let last_end = layout.offset(MAX_FRAMES_IN_FLIGHT - 1, 3) + layout.slice_size();
        assert_eq!(layout.total_size(), last_end);
    }

    #[test]
    fn test_resource_kind_indices_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in ResourceKind::ALL {
            assert!(seen.insert(kind.index()));
            assert!(kind.data_size() > 0);
        }
    }
}
