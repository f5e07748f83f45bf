//! Mesh vertex type and its Vulkan input layout

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// A single mesh vertex as laid out in the vertex buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Per-vertex colour, multiplied with the sampled texel
    pub colour: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// How vertex data advances through the buffer
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute layout matching the vertex shader interface
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            // Position (location = 0)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            // Colour (location = 1)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            // Texture coordinate (location = 2)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride_matches_layout() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.stride as usize, std::mem::size_of::<Vertex>());
    }

    #[test]
    fn test_attribute_offsets_match_field_layout() {
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);

        // Locations must be dense and start at zero for the shader interface
        for (i, attribute) in attributes.iter().enumerate() {
            assert_eq!(attribute.location, i as u32);
            assert_eq!(attribute.binding, 0);
        }
    }

    #[test]
    fn test_vertex_is_plain_old_data() {
        let vertex = Vertex {
            position: [1.0, 2.0, 3.0],
            colour: [1.0, 1.0, 1.0],
            tex_coord: [0.5, 0.25],
        };
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);

        let roundtrip: Vertex = *bytemuck::from_bytes(bytes);
        assert_eq!(roundtrip, vertex);
    }
}
