//! Camera component.
//!
//! A camera only carries projection parameters. Its pose comes from the
//! owning object's transform; the view matrix is derived from the object's
//! world matrix by the renderer.

use glam::Mat4;

/// Projection mode for a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width over height.
        aspect: f32,
        /// Near clip plane distance.
        near: f32,
        /// Far clip plane distance.
        far: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half the vertical extent of the view volume.
        half_height: f32,
        /// Width over height.
        aspect: f32,
        /// Near clip plane distance.
        near: f32,
        /// Far clip plane distance.
        far: f32,
    },
}

/// Camera component holding projection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Projection parameters.
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0)
    }
}

impl Camera {
    /// Creates a perspective camera.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            },
        }
    }

    /// Creates an orthographic camera.
    pub fn orthographic(half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic {
                half_height,
                aspect,
                near,
                far,
            },
        }
    }

    /// Updates the aspect ratio, typically after a window resize.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        match &mut self.projection {
            Projection::Perspective { aspect, .. } => *aspect = new_aspect,
            Projection::Orthographic { aspect, .. } => *aspect = new_aspect,
        }
    }

    /// Returns the projection matrix.
    ///
    /// Vulkan clip space has Y pointing down, so the Y axis is flipped
    /// relative to glam's right-handed conventions.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                half_height,
                aspect,
                near,
                far,
            } => {
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    near,
                    far,
                )
            }
        };
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::perspective(60.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let proj = camera.projection_matrix();

        // A point above the view axis projects to negative clip-space Y.
        let clip = proj * Vec3::new(0.0, 1.0, -10.0).extend(1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_set_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect(2.0);
        match camera.projection {
            Projection::Perspective { aspect, .. } => assert_eq!(aspect, 2.0),
            _ => panic!("expected perspective projection"),
        }
    }

    #[test]
    fn test_orthographic_maps_half_height_to_unit() {
        let camera = Camera::orthographic(4.0, 1.0, 0.1, 100.0);
        let proj = camera.projection_matrix();

        let clip = proj * Vec3::new(0.0, 4.0, -1.0).extend(1.0);
        // Top edge lands on the clip boundary, Y-flipped.
        assert!((clip.y + 1.0).abs() < 1e-5);
    }
}
