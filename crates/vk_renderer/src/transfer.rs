//! Synchronous transfer engine
//!
//! Host to device and device to device copies run on short-lived command
//! buffers submitted to the graphics queue. Every call blocks until the
//! queue is idle before freeing its command buffer, so two transfers can
//! never overlap: program order is execution order. This trades throughput
//! for simplicity; uploads happen at load time, not per frame.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};

/// One-shot command execution context for copies
///
/// Borrows the shared command pool and graphics queue. The pool is also
/// used by the per-frame command buffers; that sharing is safe precisely
/// because every transfer drains the queue before returning.
pub struct TransferContext<'a> {
    device: &'a Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
}

impl<'a> TransferContext<'a> {
    /// Create a transfer context over the shared pool and graphics queue
    pub fn new(device: &'a Device, command_pool: vk::CommandPool, queue: vk::Queue) -> Self {
        Self { device, command_pool, queue }
    }

    /// Record and synchronously execute a one-time command buffer
    ///
    /// Allocates a primary command buffer, begins it ONE_TIME_SUBMIT, hands
    /// it to `record`, submits, waits for the queue to go idle and frees
    /// the buffer again.
    pub fn execute<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe {
            self.device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?[0]
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let result = (|| {
            unsafe {
                self.device.begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::Api)?;
            }

            record(command_buffer);

            unsafe {
                self.device.end_command_buffer(command_buffer)
                    .map_err(VulkanError::Api)?;

                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
                self.device.queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
                    .map_err(VulkanError::Api)?;

                // Blocking here serializes all transfers against each other
                // and against the per-frame command buffers
                self.device.queue_wait_idle(self.queue)
                    .map_err(VulkanError::Api)?;
            }

            Ok(())
        })();

        unsafe {
            self.device.free_command_buffers(self.command_pool, &[command_buffer]);
        }

        result
    }

    /// Copy `size` bytes between two buffers
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.execute(|command_buffer| {
            let region = vk::BufferCopy::builder()
                .src_offset(0)
                .dst_offset(0)
                .size(size)
                .build();
            unsafe {
                self.device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
            }
        })
    }

    /// Copy a tightly-packed pixel buffer into mip level 0 of an image
    ///
    /// The image must already be in TRANSFER_DST_OPTIMAL.
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> VulkanResult<()> {
        self.execute(|command_buffer| {
            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 })
                .build();
            unsafe {
                self.device.cmd_copy_buffer_to_image(
                    command_buffer,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
        })
    }
}
