//! Interactive frame pipeline.
//!
//! This crate orchestrates each frame:
//! - Frames-in-flight pacing and surface recovery ([`RenderingLayer`])
//! - Scene recording into an offscreen viewport ([`Renderer`])
//! - Compositing the viewport onto the swapchain ([`BlitOverlay`])

pub mod backend;
pub mod camera;
pub mod context;
pub mod draw_list;
pub mod frame_manager;
pub mod overlay;
pub mod render_target;
pub mod renderer;
pub mod rendering_layer;
pub mod ubo;

pub use backend::{CommandBufferRecorder, FrameBackend, ViewportOverlay};
pub use camera::CameraInfo;
pub use context::GpuContext;
pub use frame_manager::FrameManager;
pub use overlay::BlitOverlay;
pub use render_target::RenderTargetDesc;
pub use renderer::{Renderer, RendererSettings};
pub use rendering_layer::{FrameStart, RenderingLayer, SkipReason};

/// Default number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// The Vulkan rendering layer the application drives.
pub type VulkanRenderingLayer = RenderingLayer<FrameManager, Renderer, BlitOverlay>;
