//! Uniform buffer object definitions for shaders.
//!
//! These structures must match the GLSL uniform blocks in `shaders/scene.vert`
//! exactly. All structures use `#[repr(C)]` for predictable memory layout and
//! implement `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Camera uniform block, `set = 0, binding = 0`.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUbo {
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix (view to clip space), Y already flipped for Vulkan.
    pub projection: Mat4,
}

impl CameraUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = size_of::<Self>();
}

/// Per-object uniform block, `set = 0, binding = 1`, addressed by dynamic offset.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: color (16 bytes)
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ObjectUbo {
    /// Model matrix (object to world space).
    pub model: Mat4,
    /// Flat color, linear RGBA.
    pub color: Vec4,
}

impl ObjectUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// Creates an object block.
    pub fn new(model: Mat4, color: Vec4) -> Self {
        Self { model, color }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_ubo_size() {
        // 2 Mat4 (2 * 64) = 128 bytes
        assert_eq!(CameraUbo::SIZE, 128);
    }

    #[test]
    fn test_object_ubo_size() {
        // Mat4 (64) + Vec4 (16) = 80 bytes
        assert_eq!(ObjectUbo::SIZE, 80);
    }

    #[test]
    fn test_ubo_alignment() {
        assert_eq!(std::mem::align_of::<CameraUbo>(), 16);
        assert_eq!(std::mem::align_of::<ObjectUbo>(), 16);
    }

    #[test]
    fn test_object_ubo_bytes() {
        let object = ObjectUbo::new(Mat4::IDENTITY, Vec4::new(1.0, 0.5, 0.25, 1.0));
        let bytes: &[u8] = bytemuck::bytes_of(&object);
        assert_eq!(bytes.len(), ObjectUbo::SIZE);

        let color: &[f32] = bytemuck::cast_slice(&bytes[64..80]);
        assert_eq!(color, &[1.0, 0.5, 0.25, 1.0]);
    }
}
