//! Frame loop orchestration
//!
//! Owns everything that lives for the whole run: the Vulkan context, the
//! swapchain and its dependents, the frame-slot synchronization ring and
//! the loaded models. Drives the per-tick protocol: wait on the slot's
//! fence, acquire, record, submit, present, advance — recreating the
//! swapchain whenever the surface reports it is stale.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};
use std::time::Instant;

use crate::commands::{CommandPool, CommandRecorder};
use crate::config::RendererConfig;
use crate::context::{VulkanContext, VulkanError, VulkanResult};
use crate::descriptor::{DescriptorPool, DescriptorSetLayout};
use crate::framebuffer::{DepthBuffer, Framebuffer, RenderTarget};
use crate::memory::MemoryAllocator;
use crate::model::{Model, ModelError};
use crate::pipeline::{GraphicsPipeline, ShaderModule};
use crate::render_pass::RenderPass;
use crate::swapchain::Swapchain;
use crate::sync::FrameSync;
use crate::texture::Sampler;
use crate::transfer::TransferContext;
use crate::window::Window;

/// Per-frame transform data written into the slot's uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransformUniform {
    /// Object-to-world transform
    pub model: [[f32; 4]; 4],
    /// World-to-camera transform
    pub view: [[f32; 4]; 4],
    /// Camera-to-clip transform (Vulkan clip space, Y flipped)
    pub proj: [[f32; 4]; 4],
}

impl TransformUniform {
    /// Transforms for the spinning-model scene at `seconds` since start
    pub fn spinning_scene(seconds: f32, aspect: f32) -> Self {
        let model = Matrix4::from_axis_angle(&Vector3::z_axis(), seconds * 90.0f32.to_radians());
        let view = Matrix4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vector3::z(),
        );
        let mut proj = Matrix4::new_perspective(aspect, 45.0f32.to_radians(), 0.1, 10.0);
        // nalgebra targets OpenGL clip space; Vulkan's Y points down
        proj[(1, 1)] *= -1.0;

        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }
}

type UniformBuffer = crate::buffer::UniformBuffer<TransformUniform>;

/// The renderer: owns all GPU state and drives the frame loop
///
/// Fields drop in declaration order; everything that holds device objects
/// is declared before the context so the device outlives its children.
pub struct Renderer {
    models: Vec<Model>,
    descriptor_sets: Vec<Vec<vk::DescriptorSet>>,
    descriptor_pool: Option<DescriptorPool>,
    uniform_buffers: Vec<UniformBuffer>,
    sampler: Sampler,
    framebuffers: Vec<Framebuffer>,
    depth_buffer: DepthBuffer,
    color_target: RenderTarget,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    set_layout: DescriptorSetLayout,
    swapchain: Swapchain,
    frames: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    allocator: MemoryAllocator,
    context: VulkanContext,

    config: RendererConfig,
    current_frame: usize,
    framebuffer_resized: bool,
    start_time: Instant,
}

impl Renderer {
    /// Create a renderer for the window
    pub fn new(window: &mut Window, config: RendererConfig) -> VulkanResult<Self> {
        let context = VulkanContext::new(window, &config.window.title)?;
        let device = context.raw_device();

        let allocator = MemoryAllocator::new(context.instance(), context.physical_device.device);
        let command_pool = CommandPool::new(device.clone(), context.physical_device.graphics_family)?;

        let swapchain = Swapchain::new(&context, window.framebuffer_size(), vk::SwapchainKHR::null())?;

        let samples = context.physical_device.msaa_samples;
        let depth_format = context.physical_device.depth_format;

        let render_pass = RenderPass::new_forward_pass(
            device.clone(),
            swapchain.format().format,
            depth_format,
            samples,
        )?;

        let set_layout = DescriptorSetLayout::for_scene(device.clone())?;

        let pipeline = Self::build_pipeline(&context, &config, &render_pass, &set_layout, swapchain.extent())?;

        let color_target = RenderTarget::new(
            device.clone(),
            &allocator,
            swapchain.extent(),
            swapchain.format().format,
            samples,
        )?;
        let depth_buffer = DepthBuffer::new(
            device.clone(),
            &allocator,
            swapchain.extent(),
            depth_format,
            samples,
        )?;
        let framebuffers = Self::build_framebuffers(
            &context,
            &render_pass,
            &swapchain,
            &color_target,
            &depth_buffer,
        )?;

        let sampler = Sampler::new(
            device.clone(),
            context.physical_device.anisotropy_enabled,
            context.physical_device.max_sampler_anisotropy(),
        )?;

        let frame_count = config.max_frames_in_flight;
        let mut uniform_buffers = Vec::with_capacity(frame_count);
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            uniform_buffers.push(UniformBuffer::new(device.clone(), &allocator)?);
            frames.push(FrameSync::new(device.clone())?);
        }

        let command_buffers = command_pool.allocate_command_buffers(frame_count as u32)?;

        log::info!(
            "Renderer ready: {} frames in flight, {:?} MSAA",
            frame_count,
            samples
        );

        Ok(Self {
            models: Vec::new(),
            descriptor_sets: Vec::new(),
            descriptor_pool: None,
            uniform_buffers,
            sampler,
            framebuffers,
            depth_buffer,
            color_target,
            pipeline,
            render_pass,
            set_layout,
            swapchain,
            frames,
            command_buffers,
            command_pool,
            allocator,
            context,
            config,
            current_frame: 0,
            framebuffer_resized: false,
            start_time: Instant::now(),
        })
    }

    fn build_pipeline(
        context: &VulkanContext,
        config: &RendererConfig,
        render_pass: &RenderPass,
        set_layout: &DescriptorSetLayout,
        extent: vk::Extent2D,
    ) -> VulkanResult<GraphicsPipeline> {
        let device = context.raw_device();
        let vertex_shader = ShaderModule::from_file(device.clone(), &config.shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &config.shaders.fragment_shader_path)?;

        GraphicsPipeline::new(
            device,
            render_pass.handle(),
            set_layout.handle(),
            &vertex_shader,
            &fragment_shader,
            extent,
            context.physical_device.msaa_samples,
        )
    }

    fn build_framebuffers(
        context: &VulkanContext,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        color_target: &RenderTarget,
        depth_buffer: &DepthBuffer,
    ) -> VulkanResult<Vec<Framebuffer>> {
        swapchain
            .image_views()
            .iter()
            .map(|&swapchain_view| {
                // Attachment order matches the render pass: color, depth, resolve
                let attachments = [color_target.view(), depth_buffer.view(), swapchain_view];
                Framebuffer::new(
                    context.raw_device(),
                    render_pass.handle(),
                    &attachments,
                    swapchain.extent(),
                )
            })
            .collect()
    }

    /// Load a model and its texture from disk and register it for drawing
    pub fn load_model(&mut self, model_path: &str, texture_path: &str) -> Result<(), ModelError> {
        let device = self.context.raw_device();
        let transfer = TransferContext::new(
            &device,
            self.command_pool.handle(),
            self.context.graphics_queue(),
        );

        let model = Model::load(
            self.context.raw_device(),
            &self.allocator,
            &transfer,
            model_path,
            texture_path,
            self.config.generate_mipmaps,
        )?;

        self.models.push(model);
        self.rebuild_descriptor_sets()?;
        Ok(())
    }

    /// Allocate and write one descriptor set per model per frame slot
    fn rebuild_descriptor_sets(&mut self) -> VulkanResult<()> {
        let frame_count = self.frames.len();
        let total_sets = (self.models.len() * frame_count) as u32;

        // In-flight frames may still reference sets from the old pool
        self.context.wait_idle()?;

        // Replacing the pool frees all sets allocated from the old one
        let new_pool = DescriptorPool::new(self.context.raw_device(), total_sets)?;
        self.descriptor_sets.clear();
        let pool = self.descriptor_pool.insert(new_pool);

        let mut all_sets = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let sets = pool.allocate(&self.set_layout, frame_count)?;
            for (frame_index, &set) in sets.iter().enumerate() {
                pool.write_set(
                    set,
                    self.uniform_buffers[frame_index].handle(),
                    self.uniform_buffers[frame_index].range(),
                    model.texture().view(),
                    self.sampler.handle(),
                );
            }
            all_sets.push(sets);
        }

        self.descriptor_sets = all_sets;
        Ok(())
    }

    /// Note that the window's framebuffer changed size
    ///
    /// The swapchain is rebuilt at the end of the next tick rather than
    /// immediately; acquire/present results may beat the notification to it.
    pub fn mark_resized(&mut self) {
        self.framebuffer_resized = true;
    }

    /// Draw one frame
    ///
    /// Slot protocol: wait for the slot's fence, acquire an image (a stale
    /// surface aborts the tick before the fence is reset), reset the
    /// fence, rewrite the slot's uniform buffer, record and submit the
    /// slot's command buffer, present, then advance the slot index.
    pub fn draw_frame(&mut self, window: &mut Window) -> VulkanResult<()> {
        let image_available = self.frames[self.current_frame].image_available.handle();
        let render_finished = self.frames[self.current_frame].render_finished.handle();
        let in_flight = self.frames[self.current_frame].in_flight.handle();

        // GPU may still be reading this slot's command buffer and uniforms
        self.frames[self.current_frame].in_flight.wait(u64::MAX)?;

        let acquire_result = unsafe {
            self.context.swapchain_loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };

        let (image_index, _suboptimal) = match acquire_result {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // Nothing was recorded or submitted: the fence stays
                // signaled and this tick produces no draws
                self.recreate_swapchain(window)?;
                return Ok(());
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        self.frames[self.current_frame].in_flight.reset()?;

        self.update_uniform_buffer(self.current_frame)?;

        let command_buffer = self.record_commands(self.current_frame, image_index as usize)?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context.device.device.queue_submit(
                self.context.graphics_queue(),
                &[submit_info.build()],
                in_flight,
            )
            .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_wait = [render_finished];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&present_wait)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.context.swapchain_loader()
                .queue_present(self.context.present_queue(), &present_info)
        };

        // The frame already drawn is simply not shown optimally; rebuilding
        // after the submit is fine
        let needs_recreate = match present_result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(VulkanError::Api(e)),
        };

        if needs_recreate || self.framebuffer_resized {
            self.recreate_swapchain(window)?;
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(())
    }

    fn update_uniform_buffer(&self, frame_index: usize) -> VulkanResult<()> {
        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        let seconds = self.start_time.elapsed().as_secs_f32();

        self.uniform_buffers[frame_index].update(&TransformUniform::spinning_scene(seconds, aspect))
    }

    fn record_commands(&self, frame_index: usize, image_index: usize) -> VulkanResult<vk::CommandBuffer> {
        let mut recorder =
            CommandRecorder::begin(self.context.raw_device(), self.command_buffers[frame_index])?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0, 0.0, 1.0, 1.0] },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent(),
        };

        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                self.framebuffers[image_index].handle(),
                render_area,
                &clear_values,
            );

            pass.bind_pipeline(self.pipeline.handle());

            for (model_index, model) in self.models.iter().enumerate() {
                pass.bind_vertex_buffer(model.vertex_buffer().handle());
                pass.bind_index_buffer(model.index_buffer().handle());
                pass.bind_descriptor_set(
                    self.pipeline.layout(),
                    self.descriptor_sets[model_index][frame_index],
                );
                pass.draw_indexed(model.index_count());
            }
        }

        recorder.end()
    }

    /// Tear down and rebuild the swapchain and everything sized to it
    ///
    /// Blocks while the framebuffer reports zero extent (a minimized
    /// window cannot be rendered to), drains the GPU, builds the new chain
    /// with the old handle passed through for in-flight presentation, then
    /// rebuilds render pass, pipeline, render targets and framebuffers.
    /// The frame-slot sync objects are untouched.
    pub fn recreate_swapchain(&mut self, window: &mut Window) -> VulkanResult<()> {
        self.framebuffer_resized = false;

        let (mut width, mut height) = window.framebuffer_size();
        while width == 0 || height == 0 {
            window.wait_events();
            let size = window.framebuffer_size();
            width = size.0;
            height = size.1;
        }

        self.context.wait_idle()?;

        let new_swapchain = Swapchain::new(&self.context, (width, height), self.swapchain.handle())?;

        // Old framebuffers reference the outgoing attachments; drop them first
        self.framebuffers.clear();

        let device = self.context.raw_device();
        let samples = self.context.physical_device.msaa_samples;
        let depth_format = self.context.physical_device.depth_format;

        self.render_pass = RenderPass::new_forward_pass(
            device.clone(),
            new_swapchain.format().format,
            depth_format,
            samples,
        )?;
        self.pipeline = Self::build_pipeline(
            &self.context,
            &self.config,
            &self.render_pass,
            &self.set_layout,
            new_swapchain.extent(),
        )?;
        self.color_target = RenderTarget::new(
            device.clone(),
            &self.allocator,
            new_swapchain.extent(),
            new_swapchain.format().format,
            samples,
        )?;
        self.depth_buffer = DepthBuffer::new(
            device,
            &self.allocator,
            new_swapchain.extent(),
            depth_format,
            samples,
        )?;

        // The old chain stayed alive through the new chain's creation;
        // dropping it here destroys the retired handle last
        let old_swapchain = std::mem::replace(&mut self.swapchain, new_swapchain);
        drop(old_swapchain);

        self.framebuffers = Self::build_framebuffers(
            &self.context,
            &self.render_pass,
            &self.swapchain,
            &self.color_target,
            &self.depth_buffer,
        )?;

        log::debug!("Swapchain recreated at {}x{}", width, height);
        Ok(())
    }

    /// Current swapchain extent in pixels
    pub fn swapchain_extent(&self) -> (u32, u32) {
        let extent = self.swapchain.extent();
        (extent.width, extent.height)
    }

    /// Block until all submitted GPU work finishes
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // In-flight frames must finish before sync objects and buffers go away
        let _ = self.context.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_uniform_is_plain_old_data() {
        // Three column-major mat4s, tightly packed
        assert_eq!(std::mem::size_of::<TransformUniform>(), 192);

        let ubo = TransformUniform::spinning_scene(0.0, 4.0 / 3.0);
        let bytes = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), 192);
    }

    #[test]
    fn test_spinning_scene_at_time_zero_has_identity_model() {
        let ubo = TransformUniform::spinning_scene(0.0, 1.0);
        let model = Matrix4::from(ubo.model);
        let identity = Matrix4::<f32>::identity();
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(model[(i, j)], identity[(i, j)], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_spinning_scene_flips_projection_y() {
        let ubo = TransformUniform::spinning_scene(0.0, 16.0 / 9.0);
        let proj = Matrix4::from(ubo.proj);
        // OpenGL-style projections have proj[1][1] > 0; Vulkan needs it negative
        assert!(proj[(1, 1)] < 0.0);
    }

    #[test]
    fn test_frame_slot_ring_advances_modulo_k() {
        let k = 2;
        let mut slot = 0usize;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(slot);
            slot = (slot + 1) % k;
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }
}
