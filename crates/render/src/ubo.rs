//! Uniform buffer data definitions.
//!
//! These structures must match the shader uniform block layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and
//! implement `Pod` and `Zeroable` for safe byte casting into the mapped
//! uniform slices.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Camera uniform data.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Offset 192: camera position (12 bytes)
/// - Offset 204: padding (4 bytes)
/// - Total size: 208 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CameraData {
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix (view to clip space).
    pub projection: Mat4,
    /// Combined view-projection matrix.
    pub view_projection: Mat4,
    /// Camera world position.
    pub position: Vec3,
    /// Padding for 16-byte alignment.
    pub _padding: f32,
}

impl CameraData {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates camera data from matrices and position.
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            position,
            _padding: 0.0,
        }
    }
}

/// Point light uniform data.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes) + padding (4 bytes)
/// - Offset 16: color (12 bytes)
/// - Offset 28: intensity (4 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct PointLightData {
    /// Light world position.
    pub position: Vec3,
    /// Padding for 16-byte alignment of the next field.
    pub _padding: f32,
    /// Light color (linear RGB).
    pub color: Vec3,
    /// Light intensity multiplier.
    pub intensity: f32,
}

impl PointLightData {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates point light data.
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            _padding: 0.0,
            color,
            intensity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_data_size() {
        // 3 Mat4 (3 * 64) + Vec3 (12) + padding (4) = 208 bytes
        assert_eq!(CameraData::SIZE, 208);
    }

    #[test]
    fn test_camera_data_alignment() {
        assert_eq!(std::mem::align_of::<CameraData>(), 16);
    }

    #[test]
    fn test_point_light_data_size() {
        // Vec3 + pad (16) + Vec3 (12) + f32 (4) = 32 bytes
        assert_eq!(PointLightData::SIZE, 32);
    }

    #[test]
    fn test_camera_data_new() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        let position = Vec3::new(0.0, 0.0, 5.0);

        let data = CameraData::new(view, projection, position);

        assert_eq!(data.view, view);
        assert_eq!(data.projection, projection);
        assert_eq!(data.view_projection, projection * view);
        assert_eq!(data.position, position);
    }

    #[test]
    fn test_pod_byte_casting() {
        let camera = CameraData::default();
        let bytes: &[u8] = bytemuck::bytes_of(&camera);
        assert_eq!(bytes.len(), CameraData::SIZE);

        let light = PointLightData::new(Vec3::ONE, Vec3::ONE, 2.0);
        let bytes: &[u8] = bytemuck::bytes_of(&light);
        assert_eq!(bytes.len(), PointLightData::SIZE);
    }
}
