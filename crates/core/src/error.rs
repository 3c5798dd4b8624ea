//! Error types shared across the engine.

use thiserror::Error;

/// Main error type for engine-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Shader loading errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
