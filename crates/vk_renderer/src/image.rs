//! Image resources
//!
//! A GPU image owning its handle, one backing allocation and at most one
//! view. Layout transitions are explicit: each supported (old, new) edge
//! carries its own access-mask and pipeline-stage pair, and any other edge
//! is rejected rather than guessed at.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};
use crate::memory::MemoryAllocator;
use crate::transfer::TransferContext;

/// Creation parameters for an [`Image`]
pub struct ImageDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texel format
    pub format: vk::Format,
    /// Tiling mode (optimal for everything GPU-sampled)
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub properties: vk::MemoryPropertyFlags,
    /// Number of mip levels to allocate
    pub mip_levels: u32,
    /// Sample count (for multisampled render targets)
    pub samples: vk::SampleCountFlags,
}

/// Image wrapper with one allocation and an optional view
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: Option<vk::ImageView>,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Image {
    /// Create an image and bind freshly allocated memory to it
    pub fn new(device: Device, allocator: &MemoryAllocator, desc: &ImageDesc) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(desc.samples);

        let image = unsafe {
            device.create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory = match allocator.allocate_and_bind(&device, &image, desc.properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view: None,
            extent: vk::Extent2D { width: desc.width, height: desc.height },
            mip_levels: desc.mip_levels,
        })
    }

    /// Create the image's view covering its full mip range
    pub fn create_view(&mut self, format: vk::Format, aspect: vk::ImageAspectFlags) -> VulkanResult<()> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: self.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            self.device.create_image_view(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        // Replace an existing view (swapchain recreation path)
        if let Some(old) = self.view.replace(view) {
            unsafe { self.device.destroy_image_view(old, None) };
        }

        Ok(())
    }

    /// Transition the whole mip range between two supported layouts
    ///
    /// Supported edges:
    /// - UNDEFINED -> TRANSFER_DST: no wait, top-of-pipe to transfer stage
    /// - TRANSFER_DST -> SHADER_READ_ONLY: transfer writes visible before
    ///   fragment-shader reads
    ///
    /// Anything else fails fast instead of silently proceeding with wrong
    /// masks.
    pub fn transition_layout(
        &self,
        transfer: &TransferContext,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            (old, new) => {
                return Err(VulkanError::UnsupportedLayoutTransition { old, new });
            }
        };

        transfer.execute(|command_buffer| {
            let barrier = vk::ImageMemoryBarrier::builder()
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(self.image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: self.mip_levels,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_access_mask(src_access)
                .dst_access_mask(dst_access);

            unsafe {
                self.device.cmd_pipeline_barrier(
                    command_buffer,
                    src_stage,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier.build()],
                );
            }
        })
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the image view, if one was created
    pub fn view(&self) -> Option<vk::ImageView> {
        self.view
    }

    /// Width and height in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of mip levels the image was allocated with
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // View first, then handle, then the allocation
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.destroy_image_view(view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
