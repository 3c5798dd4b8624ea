//! Windowing and input for the Ember engine.
//!
//! Wraps winit window creation, Vulkan surface creation, and per-frame
//! input state tracking.

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
