//! Frame orchestration for the Ember engine.
//!
//! This crate drives rendering on top of `ember-rhi`:
//! - [`frame`]: the frames-in-flight protocol (acquire, submit, present)
//! - [`target`]: render target abstraction (swapchain and offscreen)
//! - [`context`]: per-frame uniform slice distribution across renderers
//! - [`mesh`]: GPU mesh storage shared by all passes
//! - [`picking`]: deferred GPU object picking
//! - [`renderer`]: the [`renderer::SceneRenderer`] trait and forward renderer
//! - [`system`]: the [`system::RenderSystem`] owning the whole stack

pub mod context;
mod error;
pub mod frame;
pub mod mesh;
pub mod picking;
pub mod renderer;
pub mod system;
pub mod target;
pub mod ubo;

pub use error::{RenderError, RenderResult};

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
