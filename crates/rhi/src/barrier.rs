//! Named image layout transitions.
//!
//! Every layout transition the engine performs is enumerated here, with its
//! stage and access masks defined once. Code records transitions by name
//! instead of assembling `vk::ImageMemoryBarrier` fields at each call site,
//! which keeps the tracked layout on [`crate::image::Image`] the single
//! source of truth.

use ash::vk;

/// A named image layout transition with fixed stage/access masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutTransition {
    /// Fresh or resized color attachment, before first rendering.
    UndefinedToColor,
    /// Offscreen color attachment about to be sampled.
    ColorToShaderRead,
    /// Swapchain image after rendering, before presentation.
    ColorToPresent,
    /// Previously sampled attachment reused as a render target.
    ShaderReadToColor,
    /// Fresh or resized depth attachment.
    UndefinedToDepth,
    /// Color attachment about to be copied from (picking readback).
    ColorToTransferSrc,
    /// Copied-from attachment returned to sampling.
    TransferSrcToShaderRead,
}

impl LayoutTransition {
    /// The layout the image must be in before this transition.
    pub fn from_layout(self) -> vk::ImageLayout {
        match self {
            Self::UndefinedToColor | Self::UndefinedToDepth => vk::ImageLayout::UNDEFINED,
            Self::ColorToShaderRead | Self::ColorToPresent | Self::ColorToTransferSrc => {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            }
            Self::ShaderReadToColor => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrcToShaderRead => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        }
    }

    /// The layout the image is in after this transition.
    pub fn to_layout(self) -> vk::ImageLayout {
        match self {
            Self::UndefinedToColor | Self::ShaderReadToColor => {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            }
            Self::ColorToShaderRead | Self::TransferSrcToShaderRead => {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            }
            Self::ColorToPresent => vk::ImageLayout::PRESENT_SRC_KHR,
            Self::UndefinedToDepth => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            Self::ColorToTransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        }
    }

    /// Source and destination pipeline stage masks.
    pub fn stage_masks(self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        match self {
            Self::UndefinedToColor => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            Self::UndefinedToDepth => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            ),
            Self::ColorToShaderRead => (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            Self::ColorToPresent => (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            ),
            Self::ShaderReadToColor => (
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            Self::ColorToTransferSrc => (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::TRANSFER,
            ),
            Self::TransferSrcToShaderRead => (
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
        }
    }

    /// Source and destination access masks.
    pub fn access_masks(self) -> (vk::AccessFlags, vk::AccessFlags) {
        match self {
            Self::UndefinedToColor => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            Self::UndefinedToDepth => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            Self::ColorToShaderRead => (
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::SHADER_READ,
            ),
            Self::ColorToPresent => (
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::empty(),
            ),
            Self::ShaderReadToColor => (
                vk::AccessFlags::SHADER_READ,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            Self::ColorToTransferSrc => (
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            ),
            Self::TransferSrcToShaderRead => (
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            ),
        }
    }

    /// The image aspect this transition applies to.
    pub fn aspect_mask(self) -> vk::ImageAspectFlags {
        match self {
            Self::UndefinedToDepth => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    /// Builds the image memory barrier for `image`.
    pub fn barrier(self, image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        let (src_access, dst_access) = self.access_masks();

        vk::ImageMemoryBarrier::default()
            .old_layout(self.from_layout())
            .new_layout(self.to_layout())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect_mask())
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
    }

    /// Records this transition on `cmd`.
    pub fn record(self, device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
        let (src_stage, dst_stage) = self.stage_masks();
        let barrier = self.barrier(image);

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LayoutTransition; 7] = [
        LayoutTransition::UndefinedToColor,
        LayoutTransition::ColorToShaderRead,
        LayoutTransition::ColorToPresent,
        LayoutTransition::ShaderReadToColor,
        LayoutTransition::UndefinedToDepth,
        LayoutTransition::ColorToTransferSrc,
        LayoutTransition::TransferSrcToShaderRead,
    ];

    #[test]
    fn test_transitions_change_layout() {
        for t in ALL {
            assert_ne!(t.from_layout(), t.to_layout(), "{t:?}");
        }
    }

    #[test]
    fn test_undefined_sources_have_no_src_access() {
        for t in [
            LayoutTransition::UndefinedToColor,
            LayoutTransition::UndefinedToDepth,
        ] {
            assert_eq!(t.from_layout(), vk::ImageLayout::UNDEFINED);
            assert_eq!(t.access_masks().0, vk::AccessFlags::empty());
        }
    }

    #[test]
    fn test_present_transition_has_no_dst_access() {
        let t = LayoutTransition::ColorToPresent;
        assert_eq!(t.to_layout(), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(t.access_masks().1, vk::AccessFlags::empty());
    }

    #[test]
    fn test_depth_transition_uses_depth_aspect() {
        assert_eq!(
            LayoutTransition::UndefinedToDepth.aspect_mask(),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            LayoutTransition::UndefinedToColor.aspect_mask(),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_barrier_carries_transition_layouts() {
        let b = LayoutTransition::ColorToShaderRead.barrier(vk::Image::null());
        assert_eq!(b.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(b.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(b.subresource_range.level_count, 1);
    }

    #[test]
    fn test_readback_round_trip_is_consistent() {
        // Transfer-src readback must return the image to shader-read.
        let out = LayoutTransition::ColorToTransferSrc;
        let back = LayoutTransition::TransferSrcToShaderRead;
        assert_eq!(out.to_layout(), back.from_layout());
    }
}
