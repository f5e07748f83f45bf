//! Swapchain lifecycle management
//!
//! Creation and recreation of the presentable image chain. Surface format,
//! present mode and extent selection are pure policies over the queried
//! support data so they can be exercised without a device.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::context::{VulkanContext, VulkanError, VulkanResult};

/// Everything the surface reports about what it can present
pub struct SwapchainSupport {
    /// Surface capabilities (extents, image counts, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query the surface's capabilities, formats and present modes
    pub fn query(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.physical_device.device;
        let surface = context.surface;
        let loader = &context.surface_loader;

        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(device, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            loader.get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { capabilities, formats, present_modes })
    }
}

/// Prefer B8G8R8A8_SRGB in the sRGB non-linear color space, else take the
/// first format the surface offers
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|sf| {
            sf.format == vk::Format::B8G8R8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Prefer low-latency triple-buffered MAILBOX, else the universally
/// supported vsynced FIFO
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolve the swapchain extent from the surface capabilities
///
/// A fixed `current_extent` (width != u32::MAX) wins; otherwise the
/// framebuffer size is clamped into the reported min/max bounds.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer_size.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer_size.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more image than the driver minimum, clamped by a non-zero maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Swapchain wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    ///
    /// Pass the previous chain's handle as `old_swapchain` during
    /// recreation (null at startup); the platform uses it to migrate any
    /// in-flight presentation. The old chain stays alive on the caller's
    /// side until this returns.
    pub fn new(
        context: &VulkanContext,
        framebuffer_size: (u32, u32),
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader().clone();

        let support = SwapchainSupport::query(context)?;

        let format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);

        let graphics_family = context.physical_device.graphics_family;
        let present_family = context.physical_device.present_family;
        let queue_family_indices = [graphics_family, present_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // Images shared by distinct graphics and present families need
        // concurrent access; one family keeps exclusive ownership
        create_info = if graphics_family != present_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let image_views: Result<Vec<_>, _> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.create_image_view(&create_info, None) }
            })
            .collect();

        let image_views = image_views.map_err(VulkanError::Api)?;

        log::debug!(
            "Created swapchain: {}x{}, {} images, {:?}/{:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get per-image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of presentable images in the chain
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    fn capabilities(min: (u32, u32), max: (u32, u32), current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_extent_honours_fixed_current_extent() {
        let caps = capabilities((1, 1), (4096, 4096), (1280, 720));
        let extent = choose_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_choose_extent_clamps_into_bounds() {
        let caps = capabilities((640, 480), (1920, 1080), (u32::MAX, u32::MAX));

        let too_large = choose_extent(&caps, (5000, 5000));
        assert_eq!((too_large.width, too_large.height), (1920, 1080));

        let too_small = choose_extent(&caps, (100, 100));
        assert_eq!((too_small.width, too_small.height), (640, 480));
    }

    #[test]
    fn test_choose_extent_never_zero_for_nonzero_bounds() {
        let caps = capabilities((1, 1), (4096, 4096), (u32::MAX, u32::MAX));
        let extent = choose_extent(&caps, (0, 0));
        assert!(extent.width >= 1 && extent.height >= 1);
    }

    #[test]
    fn test_choose_image_count_requests_one_extra() {
        let mut caps = capabilities((1, 1), (4096, 4096), (800, 600));
        caps.min_image_count = 2;
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_choose_image_count_clamped_by_max() {
        let mut caps = capabilities((1, 1), (4096, 4096), (800, 600));
        caps.min_image_count = 3;
        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_choose_image_count_unbounded_max() {
        let mut caps = capabilities((1, 1), (4096, 4096), (800, 600));
        caps.min_image_count = 2;
        caps.max_image_count = 0; // zero means no limit
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_selection_policies_are_idempotent() {
        // Recreating with unchanged support data must make the same choices
        let formats = [
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        let caps = capabilities((640, 480), (1920, 1080), (u32::MAX, u32::MAX));

        let first = (
            choose_surface_format(&formats),
            choose_present_mode(&modes),
            choose_extent(&caps, (800, 600)),
        );
        let second = (
            choose_surface_format(&formats),
            choose_present_mode(&modes),
            choose_extent(&caps, (800, 600)),
        );

        assert_eq!(first.0.format, second.0.format);
        assert_eq!(first.1, second.1);
        assert_eq!((first.2.width, first.2.height), (second.2.width, second.2.height));
    }
}
