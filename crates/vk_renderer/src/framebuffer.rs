//! Framebuffer and render target management
//!
//! Per-swapchain-image framebuffers plus the two extent-sized attachments
//! they share: a multisampled color target and a multisampled depth
//! buffer. All of these are torn down and rebuilt on swapchain recreation.

use ash::{vk, Device};

use crate::context::{VulkanError, VulkanResult};
use crate::image::{Image, ImageDesc};
use crate::memory::MemoryAllocator;

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer for the given attachments
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device.create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Multisampled depth attachment sized to the swapchain extent
///
/// No explicit layout transition is needed; the render pass performs it
/// implicitly on first use.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Create a depth buffer for the current extent and sample count
    pub fn new(
        device: Device,
        allocator: &MemoryAllocator,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let mut image = Image::new(
            device,
            allocator,
            &ImageDesc {
                width: extent.width,
                height: extent.height,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                mip_levels: 1,
                samples,
            },
        )?;

        image.create_view(format, vk::ImageAspectFlags::DEPTH)?;

        Ok(Self { image })
    }

    /// Get the depth image view
    pub fn view(&self) -> vk::ImageView {
        self.image.view().unwrap_or_else(vk::ImageView::null)
    }
}

/// Multisampled transient color target the scene renders into before the
/// resolve to a swapchain image
pub struct RenderTarget {
    image: Image,
}

impl RenderTarget {
    /// Create the multisample color target for the current extent
    ///
    /// Mip level count is 1; Vulkan requires it for multisampled images.
    pub fn new(
        device: Device,
        allocator: &MemoryAllocator,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let mut image = Image::new(
            device,
            allocator,
            &ImageDesc {
                width: extent.width,
                height: extent.height,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                mip_levels: 1,
                samples,
            },
        )?;

        image.create_view(format, vk::ImageAspectFlags::COLOR)?;

        Ok(Self { image })
    }

    /// Get the color target view
    pub fn view(&self) -> vk::ImageView {
        self.image.view().unwrap_or_else(vk::ImageView::null)
    }
}
