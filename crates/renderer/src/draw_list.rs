//! CPU-side accumulation of the primitives drawn during one frame.
//!
//! Every primitive adds its vertices, its indices (already offset by the
//! vertex count before the call), one [`DrawGroup`] and one transform. The
//! list is cleared at the end of every frame, recorded or not.

use glam::{Mat4, Vec3, Vec4};

use pacer_rhi::vertex::ColoredVertex;

/// Unit triangle, counter-clockwise seen from +Z.
const TRIANGLE_POSITIONS: [Vec3; 3] = [
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
];
const TRIANGLE_INDICES: [u32; 3] = [0, 1, 2];

/// Unit square as two triangles.
const RECT_POSITIONS: [Vec3; 4] = [
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, 1.0, 0.0),
];
const RECT_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Index range of one primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawGroup {
    pub first_index: u32,
    pub index_count: u32,
}

/// Vertices, indices and per-primitive state of one frame.
#[derive(Debug, Default)]
pub struct DrawList {
    vertices: Vec<ColoredVertex>,
    indices: Vec<u32>,
    groups: Vec<DrawGroup>,
    transforms: Vec<Mat4>,
    colors: Vec<Vec4>,
}

impl DrawList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the unit triangle.
    pub fn push_triangle(&mut self, transform: Mat4, color: Vec4) {
        self.push_primitive(&TRIANGLE_POSITIONS, &TRIANGLE_INDICES, transform, color);
    }

    /// Appends the unit rectangle.
    pub fn push_rect(&mut self, transform: Mat4, color: Vec4) {
        self.push_primitive(&RECT_POSITIONS, &RECT_INDICES, transform, color);
    }

    fn push_primitive(&mut self, positions: &[Vec3], indices: &[u32], transform: Mat4, color: Vec4) {
        let base = self.vertices.len() as u32;
        let first_index = self.indices.len() as u32;

        self.vertices.extend(
            positions
                .iter()
                .map(|&position| ColoredVertex::new(position, color)),
        );
        self.indices.extend(indices.iter().map(|&index| base + index));
        self.groups.push(DrawGroup {
            first_index,
            index_count: indices.len() as u32,
        });
        self.transforms.push(transform);
        self.colors.push(color);
    }

    /// Drops everything accumulated so far.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.groups.clear();
        self.transforms.clear();
        self.colors.clear();
    }

    /// True when nothing was drawn.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[inline]
    pub fn vertices(&self) -> &[ColoredVertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn groups(&self) -> &[DrawGroup] {
        &self.groups
    }

    /// One model transform per group.
    #[inline]
    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    /// One color per group.
    #[inline]
    pub fn colors(&self) -> &[Vec4] {
        &self.colors
    }

    /// Bytes of vertex data.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Bytes of index data.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
    const BLUE: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);

    #[test]
    fn test_empty_list() {
        let list = DrawList::new();
        assert!(list.is_empty());
        assert!(list.vertex_bytes().is_empty());
        assert!(list.index_bytes().is_empty());
    }

    #[test]
    fn test_triangle_then_rect() {
        let mut list = DrawList::new();
        list.push_triangle(Mat4::IDENTITY, RED);
        list.push_rect(Mat4::from_translation(Vec3::X), BLUE);

        assert_eq!(
            list.groups(),
            &[
                DrawGroup {
                    first_index: 0,
                    index_count: 3
                },
                DrawGroup {
                    first_index: 3,
                    index_count: 6
                },
            ]
        );
        assert_eq!(list.indices(), &[0, 1, 2, 3, 4, 5, 5, 6, 3]);
        assert_eq!(list.vertices().len(), 7);
        assert_eq!(list.transforms()[1], Mat4::from_translation(Vec3::X));
        assert_eq!(list.colors(), &[RED, BLUE]);
    }

    #[test]
    fn test_rect_corners() {
        let mut list = DrawList::new();
        list.push_rect(Mat4::IDENTITY, BLUE);

        let positions: Vec<Vec3> = list.vertices().iter().map(|v| v.position).collect();
        assert_eq!(positions, RECT_POSITIONS.to_vec());
        assert!(list.vertices().iter().all(|v| v.color == BLUE.to_array()));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut list = DrawList::new();
        list.push_triangle(Mat4::IDENTITY, RED);
        list.clear();

        assert!(list.is_empty());
        assert!(list.vertices().is_empty());
        assert!(list.indices().is_empty());
        assert!(list.transforms().is_empty());

        list.push_rect(Mat4::IDENTITY, RED);
        assert_eq!(list.indices()[0], 0);
    }

    #[test]
    fn test_byte_views() {
        let mut list = DrawList::new();
        list.push_triangle(Mat4::IDENTITY, RED);

        assert_eq!(list.vertex_bytes().len(), 3 * size_of::<ColoredVertex>());
        assert_eq!(list.index_bytes().len(), 3 * size_of::<u32>());
    }
}
