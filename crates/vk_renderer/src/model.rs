//! Loaded models
//!
//! A model owns its host-side vertex and index arrays, the device-local
//! buffers they were uploaded into, and one texture. GPU resources are
//! released when the model drops, before the device goes away.

use ash::Device;
use thiserror::Error;

use crate::assets::{self, AssetError, ImageData};
use crate::buffer::{IndexBuffer, VertexBuffer};
use crate::context::VulkanError;
use crate::memory::MemoryAllocator;
use crate::mesh::Vertex;
use crate::texture::Texture;
use crate::transfer::TransferContext;

/// Model loading errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model or texture file could not be loaded or parsed
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// GPU upload failed
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// A renderable model: host data, GPU buffers and a texture
pub struct Model {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    texture: Texture,
}

impl Model {
    /// Load an OBJ model and its texture and upload both to the GPU
    pub fn load(
        device: Device,
        allocator: &MemoryAllocator,
        transfer: &TransferContext,
        model_path: &str,
        texture_path: &str,
        generate_mipmaps: bool,
    ) -> Result<Self, ModelError> {
        let mesh = assets::load_obj(model_path)?;
        let image = ImageData::from_file(texture_path)?;

        let vertex_buffer = VertexBuffer::new(device.clone(), allocator, transfer, &mesh.vertices)?;
        let index_buffer = IndexBuffer::new(device.clone(), allocator, transfer, &mesh.indices)?;

        let texture = Texture::from_pixels(
            device,
            allocator,
            transfer,
            &image.pixels,
            image.width,
            image.height,
            generate_mipmaps,
        )?;

        Ok(Self {
            vertices: mesh.vertices,
            indices: mesh.indices,
            vertex_buffer,
            index_buffer,
            texture,
        })
    }

    /// Host-side vertex array
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Host-side index array
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Device-local vertex buffer
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    /// Device-local index buffer
    pub fn index_buffer(&self) -> &IndexBuffer {
        &self.index_buffer
    }

    /// The model's texture
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_buffer.index_count()
    }
}
