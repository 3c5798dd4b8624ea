//! Core utilities for the Ember engine.
//!
//! This crate provides foundational types used across the engine:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing

mod error;
mod logging;
mod timer;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
