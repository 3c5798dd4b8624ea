//! Local transform component.
//!
//! A transform holds position, rotation, and scale in the space of its
//! parent object. World-space matrices are composed by walking the parent
//! chain, which the [`Scene`](crate::Scene) owns; a transform on its own
//! only knows its local state.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Position, rotation, and scale relative to the parent object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation in parent space.
    pub position: Vec3,
    /// Rotation as a quaternion.
    pub rotation: Quat,
    /// Non-uniform scale factors.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Creates an identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transform at the given position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Creates a transform with the given rotation.
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Default::default()
        }
    }

    /// Creates a transform with the given uniform scale.
    pub fn from_scale(scale: f32) -> Self {
        Self {
            scale: Vec3::splat(scale),
            ..Default::default()
        }
    }

    /// Sets the position and returns self for chaining.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Sets the rotation and returns self for chaining.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the scale and returns self for chaining.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Translates by the given offset in parent space.
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Applies an additional rotation.
    pub fn rotate(&mut self, rotation: Quat) {
        self.rotation = rotation * self.rotation;
    }

    /// Rotates around an axis by an angle in radians.
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        self.rotate(Quat::from_axis_angle(axis.normalize(), angle));
    }

    /// Returns the local transformation matrix (scale, then rotate, then
    /// translate).
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Returns the normal matrix for the given world matrix.
    ///
    /// The inverse-transpose of the upper 3x3 keeps normals perpendicular
    /// under non-uniform scale. Falls back to the rotation matrix when the
    /// world matrix is singular.
    pub fn normal_matrix(world: Mat4) -> Mat3 {
        let upper = Mat3::from_mat4(world);
        if upper.determinant().abs() < 1e-6 {
            return Mat3::IDENTITY;
        }
        upper.inverse().transpose()
    }

    /// Returns the local forward direction (negative Z).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Returns the local right direction (positive X).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Returns the local up direction (positive Y).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn assert_vec3_eq(a: Vec3, b: Vec3) {
        assert!(
            (a - b).length() < 1e-5,
            "expected {:?}, got {:?}",
            b,
            a
        );
    }

    #[test]
    fn test_default_is_identity() {
        let transform = Transform::default();
        assert_eq!(transform.local_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_from_position() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let point = transform.local_matrix().transform_point3(Vec3::ZERO);
        assert_vec3_eq(point, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_translate_accumulates() {
        let mut transform = Transform::new();
        transform.translate(Vec3::X);
        transform.translate(Vec3::X);
        assert_vec3_eq(transform.position, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_rotation_turns_forward() {
        let mut transform = Transform::new();
        assert_vec3_eq(transform.forward(), Vec3::NEG_Z);

        transform.rotate_axis(Vec3::Y, FRAC_PI_2);
        assert_vec3_eq(transform.forward(), Vec3::NEG_X);
        assert_vec3_eq(transform.right(), Vec3::NEG_Z);
        assert_vec3_eq(transform.up(), Vec3::Y);
    }

    #[test]
    fn test_local_matrix_order() {
        // Scale is applied before translation, so a unit point lands at
        // translation + scaled offset.
        let transform = Transform::from_position(Vec3::new(10.0, 0.0, 0.0))
            .with_scale(Vec3::splat(2.0));
        let point = transform.local_matrix().transform_point3(Vec3::X);
        assert_vec3_eq(point, Vec3::new(12.0, 0.0, 0.0));
    }

    #[test]
    fn test_normal_matrix_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = Transform::normal_matrix(world) * Vec3::X;
        // Still points along X; only its length changes.
        assert_vec3_eq(normal.normalize(), Vec3::X);
    }

    #[test]
    fn test_normal_matrix_singular_falls_back() {
        let world = Mat4::from_scale(Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(Transform::normal_matrix(world), Mat3::IDENTITY);
    }
}
