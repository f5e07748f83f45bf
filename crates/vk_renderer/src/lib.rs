//! # vk_renderer
//!
//! A minimal real-time Vulkan renderer built on [ash]. The crate owns the
//! GPU device connection, the swapchain lifecycle (including recreation
//! when the surface is invalidated), per-frame CPU/GPU synchronization
//! with a fixed ring of frame slots, and the staging-transfer and
//! image-layout machinery behind buffers and mipmapped textures.
//!
//! The intended entry point is [`renderer::Renderer`]: create a
//! [`window::Window`], hand it a [`config::RendererConfig`], load a model,
//! and call `draw_frame` once per tick.
//!
//! Deliberate scope limits: one CPU thread records and submits; every
//! resource gets its own memory allocation (no pooling); transfers are
//! synchronous one-shot submissions. These are design choices, not gaps.

#![warn(missing_docs)]

pub mod assets;
pub mod buffer;
pub mod commands;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod framebuffer;
pub mod image;
pub mod memory;
pub mod mesh;
pub mod model;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod transfer;
pub mod window;

pub use config::RendererConfig;
pub use context::{VulkanError, VulkanResult};
pub use mesh::Vertex;
pub use model::{Model, ModelError};
pub use renderer::Renderer;
pub use window::{Window, WindowError};
