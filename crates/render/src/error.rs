use thiserror::Error;

use ember_rhi::RhiError;

/// Errors produced by the render crate.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An underlying Vulkan or allocation error.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// All uniform slices are taken; no more renderers can register.
    #[error("Renderer slice capacity exceeded (capacity: {capacity})")]
    SliceCapacityExceeded {
        /// Number of slices the render context was created with.
        capacity: u32,
    },

    /// A frame index outside `[0, MAX_FRAMES_IN_FLIGHT)` was passed.
    #[error("Frame index {frame} out of range (frames in flight: {max})")]
    FrameOutOfRange {
        /// Offending frame index.
        frame: usize,
        /// Number of frames in flight.
        max: usize,
    },

    /// A slice index outside the registered capacity was passed.
    #[error("Slice index {slice} out of range (capacity: {capacity})")]
    SliceOutOfRange {
        /// Offending slice index.
        slice: u32,
        /// Number of slices the render context was created with.
        capacity: u32,
    },

    /// `descriptor_set` was called before `create_descriptor_sets`.
    #[error("Descriptor sets for {kind} resource have not been created")]
    DescriptorSetsMissing {
        /// Resource kind name.
        kind: &'static str,
    },
}

/// Convenience alias for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
