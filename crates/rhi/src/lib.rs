//! Vulkan abstraction layer for the Ember engine.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Swapchain management
//! - Command buffer recording
//! - Buffer and image resources with explicit alignment and layout tracking
//! - Descriptor and pipeline creation
//! - Synchronization primitives

mod error;

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
