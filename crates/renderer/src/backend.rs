//! Seams between the frame orchestrator and the GPU.
//!
//! [`RenderingLayer`](crate::RenderingLayer) drives three parties:
//!
//! - a [`FrameBackend`] owning the per-slot synchronization, the swapchain
//!   and the offscreen viewport images,
//! - a [`CommandBufferRecorder`] producing the scene command buffer,
//! - a [`ViewportOverlay`] deciding the viewport size and compositing it
//!   onto the swapchain image.
//!
//! The Vulkan implementations live in [`frame_manager`](crate::frame_manager),
//! [`renderer`](crate::renderer) and [`overlay`](crate::overlay).

use ash::vk;

use pacer_rhi::RhiResult;
use pacer_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::render_target::RenderTargetDesc;

/// Per-slot synchronization plus the two render targets.
pub trait FrameBackend {
    /// Number of frame-in-flight slots.
    fn frames_in_flight(&self) -> usize;

    /// Blocks until `slot`'s fence is signaled.
    fn wait_for_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Unsignals `slot`'s fence. Only valid right after a successful wait.
    fn reset_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Non-blocking poll of `slot`'s fence.
    fn is_fence_signaled(&self, slot: usize) -> RhiResult<bool>;

    /// Acquires a presentable image, signaling `slot`'s image-available
    /// semaphore when it is ready.
    fn acquire_next_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Consumes `slot`'s signaled image-available semaphore without
    /// rendering, signaling `slot`'s fence. The fence must be unsignaled.
    fn release_acquired_image(&mut self, slot: usize) -> RhiResult<()>;

    /// Submits `command_buffers` in order: waits on `slot`'s image-available
    /// semaphore, signals its render-finished semaphore and its fence.
    fn submit(&mut self, slot: usize, command_buffers: &[vk::CommandBuffer]) -> RhiResult<()>;

    /// Presents `image_index` once `slot`'s render-finished semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Rebuilds the swapchain for a framebuffer of `extent`. Every slot fence
    /// has been waited.
    ///
    /// Returns `None` and keeps the stale swapchain while the surface has
    /// zero area.
    fn recreate_surface(&mut self, extent: vk::Extent2D) -> RhiResult<Option<RenderTargetDesc>>;

    /// Rebuilds the viewport images at `extent`, one per swapchain image.
    /// Every slot fence has been waited.
    fn recreate_viewport(&mut self, extent: vk::Extent2D) -> RhiResult<RenderTargetDesc>;

    /// Current swapchain images.
    fn surface_target(&self) -> &RenderTargetDesc;

    /// Current viewport images.
    fn viewport_target(&self) -> &RenderTargetDesc;
}

/// Produces one command buffer per acquired frame.
pub trait CommandBufferRecorder {
    /// Starts `slot`'s frame. Its previous submission has completed.
    fn begin_frame(&mut self, slot: usize) -> RhiResult<()>;

    /// Records the frame's work for swapchain image `image_index`.
    fn record_command_buffer(&mut self, image_index: u32) -> RhiResult<vk::CommandBuffer>;

    /// Drops everything accumulated for the frame. Called for every frame,
    /// including skipped ones.
    fn end_frame(&mut self);

    /// The swapchain was rebuilt.
    fn on_surface_resized(&mut self, _target: &RenderTargetDesc) {}

    /// The viewport images were rebuilt.
    fn on_viewport_resized(&mut self, _target: &RenderTargetDesc) {}
}

/// Recorder that also decides how large the viewport panel is.
pub trait ViewportOverlay: CommandBufferRecorder {
    /// Desired viewport size for the coming frame. Runs at the top of every
    /// `begin_frame`, before any GPU work, and again after a surface rebuild.
    fn layout(&mut self) -> vk::Extent2D;
}
