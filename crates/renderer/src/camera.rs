//! Scene camera parameters and matrices.

use glam::{Mat4, Vec3};

use crate::ubo::CameraUbo;

/// Camera description set by the scene once per frame or less.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraInfo {
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance.
    pub far: f32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Eye position in world space.
    pub position: Vec3,
    /// Point the camera looks at.
    pub target: Vec3,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 10.0,
            fov_degrees: 45.0,
            position: Vec3::new(0.0, 0.0, -5.0),
            target: Vec3::ZERO,
        }
    }
}

impl CameraInfo {
    /// Right-handed look-at view matrix with +Y up.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// Right-handed perspective projection for `aspect`.
    ///
    /// Vulkan clip space has Y pointing down, so the Y scale is negated.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut projection =
            Mat4::perspective_rh(self.fov_degrees.to_radians(), aspect, self.near, self.far);
        projection.y_axis.y = -projection.y_axis.y;
        projection
    }

    /// Camera block for a target of `width` x `height` pixels.
    ///
    /// A zero height falls back to an aspect of 1.
    pub fn to_ubo(&self, width: u32, height: u32) -> CameraUbo {
        let aspect = if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        };

        CameraUbo {
            view: self.view_matrix(),
            projection: self.projection_matrix(aspect),
        }
    }
}
