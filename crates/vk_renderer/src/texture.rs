//! Sampled textures and mipmap generation
//!
//! Turns a decoded RGBA8 host image into a device-local, shader-readable
//! texture: staging upload into mip level 0, then either a blit chain that
//! fills the remaining levels or a single whole-range transition when
//! mipmaps are disabled.

use ash::{vk, Device};

use crate::buffer::StagingBuffer;
use crate::context::{VulkanError, VulkanResult};
use crate::image::{Image, ImageDesc};
use crate::memory::MemoryAllocator;
use crate::transfer::TransferContext;

/// Number of mip levels for a base image: floor(log2(max(w, h))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// Extent of mip level `level`, halving with floor and clamping at 1
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// A mip-chain-aware sampled texture
pub struct Texture {
    image: Image,
    width: u32,
    height: u32,
    mip_levels: u32,
}

impl Texture {
    /// Upload decoded RGBA8 pixels into a sampled GPU texture
    ///
    /// With `generate_mips` the image gets the full mip chain, filled by
    /// repeated half-resolution blits; without it the level count is
    /// forced to 1.
    pub fn from_pixels(
        device: Device,
        allocator: &MemoryAllocator,
        transfer: &TransferContext,
        pixels: &[u8],
        width: u32,
        height: u32,
        generate_mips: bool,
    ) -> VulkanResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "pixel buffer is {} bytes, expected {} for {}x{} RGBA",
                    pixels.len(),
                    expected,
                    width,
                    height
                ),
            });
        }

        let mip_levels = if generate_mips { mip_level_count(width, height) } else { 1 };

        let staging = StagingBuffer::new_with_data(device.clone(), allocator, pixels)?;

        let mut image = Image::new(
            device.clone(),
            allocator,
            &ImageDesc {
                width,
                height,
                format: vk::Format::R8G8B8A8_SRGB,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                mip_levels,
                samples: vk::SampleCountFlags::TYPE_1,
            },
        )?;

        image.transition_layout(
            transfer,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        transfer.copy_buffer_to_image(staging.handle(), image.handle(), width, height)?;

        if generate_mips {
            Self::generate_mipmaps(&device, transfer, &image, width, height)?;
        } else {
            image.transition_layout(
                transfer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
        }

        image.create_view(vk::Format::R8G8B8A8_SRGB, vk::ImageAspectFlags::COLOR)?;

        log::debug!("Created {}x{} texture with {} mip levels", width, height, mip_levels);

        Ok(Self { image, width, height, mip_levels })
    }

    /// Fill mip levels 1..L by blitting each level from the previous one
    ///
    /// Level i-1 goes TRANSFER_DST -> TRANSFER_SRC before the blit and
    /// TRANSFER_SRC -> SHADER_READ_ONLY after it; the last level, never
    /// blitted from, gets its own TRANSFER_DST -> SHADER_READ_ONLY barrier
    /// after the loop.
    fn generate_mipmaps(
        device: &Device,
        transfer: &TransferContext,
        image: &Image,
        width: u32,
        height: u32,
    ) -> VulkanResult<()> {
        let mip_levels = image.mip_levels();

        transfer.execute(|command_buffer| {
            let mut barrier = vk::ImageMemoryBarrier::builder()
                .image(image.handle())
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .build();

            let mut mip_width = width as i32;
            let mut mip_height = height as i32;

            for level in 1..mip_levels {
                // Wait for the previous copy or blit into level - 1
                barrier.subresource_range.base_mip_level = level - 1;
                barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
                barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
                barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
                barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;

                unsafe {
                    device.cmd_pipeline_barrier(
                        command_buffer,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }

                let dst_width = if mip_width > 1 { mip_width / 2 } else { 1 };
                let dst_height = if mip_height > 1 { mip_height / 2 } else { 1 };

                let blit = vk::ImageBlit::builder()
                    .src_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
                    ])
                    .src_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: level - 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .dst_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: dst_width, y: dst_height, z: 1 },
                    ])
                    .dst_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: level,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .build();

                unsafe {
                    device.cmd_blit_image(
                        command_buffer,
                        image.handle(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image.handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::NEAREST,
                    );
                }

                // Level - 1 is final now; release it to the fragment shader
                barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
                barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
                barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
                barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;

                unsafe {
                    device.cmd_pipeline_barrier(
                        command_buffer,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::FRAGMENT_SHADER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }

                if mip_width > 1 {
                    mip_width /= 2;
                }
                if mip_height > 1 {
                    mip_height /= 2;
                }
            }

            // The last level was only ever blitted into
            barrier.subresource_range.base_mip_level = mip_levels - 1;
            barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
            barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
            barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
            barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;

            unsafe {
                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
        })
    }

    /// View over the full mip chain
    pub fn view(&self) -> vk::ImageView {
        // The constructor always creates the view
        self.image.view().unwrap_or_else(vk::ImageView::null)
    }

    /// Base width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Base height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

/// Texture sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create the scene sampler
    ///
    /// Nearest magnification keeps close-up texels crisp, linear
    /// minification smooths distant ones; mip selection is linear across
    /// the whole chain.
    pub fn new(
        device: Device,
        anisotropy_enabled: bool,
        max_anisotropy: f32,
    ) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy_enabled)
            .max_anisotropy(if anisotropy_enabled { max_anisotropy } else { 1.0 })
            .border_color(vk::BorderColor::INT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe {
            device.create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Get the sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count_512() {
        // 2^9 = 512, so nine halvings plus the base level
        assert_eq!(mip_level_count(512, 512), 10);
    }

    #[test]
    fn test_mip_level_count_uses_largest_dimension() {
        assert_eq!(mip_level_count(512, 64), 10);
        assert_eq!(mip_level_count(64, 512), 10);
    }

    #[test]
    fn test_mip_level_count_bounds() {
        // 2^(L-1) <= max(w, h) < 2^L
        for &(w, h) in &[(1u32, 1u32), (2, 2), (3, 3), (100, 60), (512, 512), (1920, 1080)] {
            let levels = mip_level_count(w, h);
            let largest = w.max(h);
            assert!(1u32 << (levels - 1) <= largest);
            assert!(largest < 1u32 << levels);
        }
    }

    #[test]
    fn test_mip_extent_halves_with_floor() {
        assert_eq!(mip_extent(100, 60, 1), (50, 30));
        assert_eq!(mip_extent(100, 60, 2), (25, 15));
        // Floor division: 25 / 2 = 12
        assert_eq!(mip_extent(100, 60, 3), (12, 7));
    }

    #[test]
    fn test_mip_extent_clamps_at_one() {
        // Narrow images keep the short axis pinned at 1
        assert_eq!(mip_extent(512, 2, 3), (64, 1));
        assert_eq!(mip_extent(512, 2, 9), (1, 1));
    }

    #[test]
    fn test_final_mip_level_of_512_is_one_by_one() {
        let levels = mip_level_count(512, 512);
        assert_eq!(mip_extent(512, 512, levels - 1), (1, 1));
    }
}
