//! Vertex format of the scene pipeline.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Position and color of one vertex.
///
/// The color is stored as a plain array so the struct stays padding-free
/// whatever alignment glam gives `Vec4`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColoredVertex {
    /// Object-space position.
    pub position: Vec3,
    /// Linear RGBA color.
    pub color: [f32; 4],
}

impl ColoredVertex {
    /// Creates a vertex.
    #[inline]
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position,
            color: color.to_array(),
        }
    }

    /// Per-vertex binding 0.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position at location 0, color at location 1.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 12,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colored_vertex_size() {
        // Vec3 (12) + [f32; 4] (16)
        assert_eq!(size_of::<ColoredVertex>(), 28);
    }

    #[test]
    fn test_binding_description() {
        let binding = ColoredVertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 28);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_descriptions() {
        let attrs = ColoredVertex::attribute_descriptions();

        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attrs[1].offset, 12);
    }

    #[test]
    fn test_new_stores_color_components() {
        let vertex = ColoredVertex::new(Vec3::new(1.0, 2.0, 3.0), Vec4::new(0.1, 0.2, 0.3, 0.4));
        assert_eq!(vertex.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vertex.color, [0.1, 0.2, 0.3, 0.4]);
    }
}
