//! Composites the viewport image onto the swapchain image.
//!
//! [`BlitOverlay`] sizes the viewport as a fixed fraction of the window and
//! letterboxes it, centered, over a cleared background.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use pacer_rhi::command::{CommandBuffer, CommandPool};
use pacer_rhi::device::Device;
use pacer_rhi::{RhiError, RhiResult};

use crate::backend::{CommandBufferRecorder, ViewportOverlay};
use crate::render_target::RenderTargetDesc;

/// Stages the frame submission waits for the image-available semaphore in.
/// The swapchain image transition chains onto that wait.
pub const SWAPCHAIN_RELEASE_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::ALL_TRANSFER.as_raw()
        | vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT.as_raw(),
);

/// `extent` scaled by `scale` on both axes, rounded down.
///
/// Non-empty inputs never produce an empty result.
pub fn scaled_extent(extent: vk::Extent2D, scale: f32) -> vk::Extent2D {
    let scale_axis = |value: u32| {
        if value == 0 {
            0
        } else {
            ((value as f32 * scale) as u32).max(1)
        }
    };

    vk::Extent2D {
        width: scale_axis(extent.width),
        height: scale_axis(extent.height),
    }
}

/// Largest rectangle with `content`'s aspect ratio that fits in `frame`,
/// centered.
pub fn letterbox(content: vk::Extent2D, frame: vk::Extent2D) -> vk::Rect2D {
    if content.width == 0 || content.height == 0 || frame.width == 0 || frame.height == 0 {
        return vk::Rect2D::default();
    }

    // Compare content.w / content.h against frame.w / frame.h without floats.
    let content_wider =
        content.width as u64 * frame.height as u64 >= frame.width as u64 * content.height as u64;

    let extent = if content_wider {
        vk::Extent2D {
            width: frame.width,
            height: ((frame.width as u64 * content.height as u64 / content.width as u64) as u32)
                .max(1),
        }
    } else {
        vk::Extent2D {
            width: ((frame.height as u64 * content.width as u64 / content.height as u64) as u32)
                .max(1),
            height: frame.height,
        }
    };

    vk::Rect2D {
        offset: vk::Offset2D {
            x: ((frame.width - extent.width) / 2) as i32,
            y: ((frame.height - extent.height) / 2) as i32,
        },
        extent,
    }
}

/// Blits the viewport into the middle of the swapchain image.
pub struct BlitOverlay {
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    surface: RenderTargetDesc,
    viewport: RenderTargetDesc,
    viewport_scale: f32,
    background: [f32; 4],
    frame_slot: Option<usize>,
}

impl BlitOverlay {
    /// Creates one command buffer per slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the command pool or buffers cannot be created.
    pub fn new(
        device: Arc<Device>,
        frames_in_flight: usize,
        viewport_scale: f32,
        background: [f32; 4],
    ) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics()?)?;
        let command_buffers = command_pool.allocate(frames_in_flight as u32)?;

        Ok(Self {
            command_buffers,
            command_pool,
            surface: RenderTargetDesc::default(),
            viewport: RenderTargetDesc::default(),
            viewport_scale,
            background,
            frame_slot: None,
        })
    }

    /// Changes the fraction of the window the viewport covers. Takes effect
    /// at the next `begin_frame` of the rendering layer.
    pub fn set_viewport_scale(&mut self, scale: f32) {
        self.viewport_scale = scale.clamp(f32::EPSILON, 1.0);
    }

    #[inline]
    pub fn viewport_scale(&self) -> f32 {
        self.viewport_scale
    }
}

impl CommandBufferRecorder for BlitOverlay {
    fn begin_frame(&mut self, slot: usize) -> RhiResult<()> {
        if slot >= self.command_buffers.len() {
            return Err(RhiError::InvalidHandle(format!(
                "frame slot {} out of range ({} slots)",
                slot,
                self.command_buffers.len()
            )));
        }
        self.frame_slot = Some(slot);
        Ok(())
    }

    fn record_command_buffer(&mut self, image_index: u32) -> RhiResult<vk::CommandBuffer> {
        let slot = self.frame_slot.ok_or_else(|| {
            RhiError::FrameOrder("overlay recorded outside begin_frame/end_frame".to_string())
        })?;

        let (swapchain_image, _) = self.surface.get(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no swapchain image {}", image_index))
        })?;
        let (viewport_image, _) = self.viewport.get(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no viewport image for swapchain image {}", image_index))
        })?;

        let command_buffer = &self.command_buffers[slot];
        command_buffer.reset()?;
        command_buffer.begin()?;

        command_buffer.transition_image_layout_after(
            swapchain_image,
            SWAPCHAIN_RELEASE_STAGES,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        command_buffer.clear_color_image(swapchain_image, self.background);

        // Orders the blit after the clear.
        command_buffer.transition_image_layout(
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        let region = letterbox(self.viewport.extent, self.surface.extent);
        command_buffer.blit_image(viewport_image, self.viewport.extent, swapchain_image, region);

        command_buffer.transition_image_layout(
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        command_buffer.end()?;

        Ok(command_buffer.handle())
    }

    fn end_frame(&mut self) {
        self.frame_slot = None;
    }

    fn on_surface_resized(&mut self, target: &RenderTargetDesc) {
        self.surface = target.clone();
    }

    fn on_viewport_resized(&mut self, target: &RenderTargetDesc) {
        debug!(
            "Overlay displays {} viewport image(s) at {}x{}",
            target.image_count(),
            target.extent.width,
            target.extent.height
        );
        self.viewport = target.clone();
    }
}

impl ViewportOverlay for BlitOverlay {
    fn layout(&mut self) -> vk::Extent2D {
        scaled_extent(self.surface.extent, self.viewport_scale)
    }
}
