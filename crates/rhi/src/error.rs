//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No supported format among the requested candidates
    #[error("No supported format among candidates: {0}")]
    FormatNotSupported(String),

    /// Swapchain recreation negotiated a different image format
    #[error("Swapchain format changed during recreation: {old:?} -> {new:?}")]
    FormatChanged {
        old: ash::vk::Format,
        new: ash::vk::Format,
    },

    /// Invalid argument passed to an RHI call
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Buffer memory is not host-visible
    #[error("Buffer memory is not host-visible")]
    NotHostVisible,

    /// Buffer must be mapped before writing
    #[error("Buffer is not mapped")]
    NotMapped,

    /// Per-index access outside the buffer's instance count
    #[error("Buffer index {index} out of bounds (instance count {count})")]
    IndexOutOfBounds { index: u64, count: u64 },

    /// Write or flush range exceeds the buffer size
    #[error("Range {offset}+{size} exceeds buffer size {buffer_size}")]
    RangeOutOfBounds {
        offset: u64,
        size: u64,
        buffer_size: u64,
    },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
