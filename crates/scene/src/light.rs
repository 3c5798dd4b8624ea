//! Light components.
//!
//! Light position comes from the owning object's transform; the component
//! only stores the photometric parameters.

use glam::Vec3;

/// Point light component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Light color (linear RGB).
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Influence radius in world units.
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

impl PointLight {
    /// Creates a point light with the given color and intensity.
    pub fn new(color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            color,
            intensity,
            radius,
        }
    }
}
