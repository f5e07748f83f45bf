//! Buffer management for vertex, index and uniform data
//!
//! Every buffer owns exactly one allocation, bound before first use and
//! released together with the handle on drop. Mesh data lives in
//! device-local memory and is filled through a staging buffer; uniform
//! buffers stay host-visible and are rewritten every frame.

use ash::{vk, Device};
use bytemuck::Pod;
use std::marker::PhantomData;
use std::mem;

use crate::context::{VulkanError, VulkanResult};
use crate::memory::MemoryAllocator;
use crate::transfer::TransferContext;

/// Buffer wrapper owning its handle and backing allocation
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        device: Device,
        allocator: &MemoryAllocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory = match allocator.allocate_and_bind(&device, &buffer, properties) {
            Ok(memory) => memory,
            Err(e) => {
                // Allocation failed after the handle was created; release
                // the handle so nothing dangles
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(Self { device, buffer, memory, size })
    }

    /// Write a slice of plain-old-data into a host-visible buffer
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        unsafe {
            let ptr = self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Handle before allocation; the reverse order is undefined
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Transient host-visible buffer used as a transfer source
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a staging buffer pre-filled with the given bytes
    pub fn new_with_data(
        device: Device,
        allocator: &MemoryAllocator,
        data: &[u8],
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            allocator,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        buffer.write_data(data)?;

        Ok(Self { buffer })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Device-local vertex buffer filled through a staging copy
pub struct VertexBuffer {
    buffer: Buffer,
}

impl VertexBuffer {
    /// Upload vertex data into device-local memory
    pub fn new<T: Pod>(
        device: Device,
        allocator: &MemoryAllocator,
        transfer: &TransferContext,
        vertices: &[T],
    ) -> VulkanResult<Self> {
        let size = (vertices.len() * mem::size_of::<T>()) as vk::DeviceSize;

        let staging = StagingBuffer::new_with_data(
            device.clone(),
            allocator,
            bytemuck::cast_slice(vertices),
        )?;

        let buffer = Buffer::new(
            device,
            allocator,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        transfer.copy_buffer(staging.handle(), buffer.handle(), size)?;

        Ok(Self { buffer })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

/// Device-local index buffer with 32-bit indices
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Upload index data into device-local memory
    pub fn new(
        device: Device,
        allocator: &MemoryAllocator,
        transfer: &TransferContext,
        indices: &[u32],
    ) -> VulkanResult<Self> {
        let size = (indices.len() * mem::size_of::<u32>()) as vk::DeviceSize;

        let staging = StagingBuffer::new_with_data(
            device.clone(),
            allocator,
            bytemuck::cast_slice(indices),
        )?;

        let buffer = Buffer::new(
            device,
            allocator,
            size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        transfer.copy_buffer(staging.handle(), buffer.handle(), size)?;

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get index count
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Host-visible uniform buffer, one per frame slot
///
/// Created once at startup and rewritten every frame for the slot that just
/// cleared its fence; never destroyed and recreated mid-run.
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create an uninitialized uniform buffer sized to `T`
    pub fn new(device: Device, allocator: &MemoryAllocator) -> VulkanResult<Self> {
        let size = mem::size_of::<T>() as vk::DeviceSize;

        let buffer = Buffer::new(
            device,
            allocator,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: PhantomData,
        })
    }

    /// Overwrite the buffer contents
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size of the uniform block in bytes
    pub fn range(&self) -> vk::DeviceSize {
        mem::size_of::<T>() as vk::DeviceSize
    }
}
