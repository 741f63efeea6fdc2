//! Vulkan frame backend.
//!
//! This module provides [`FrameManager`], the [`FrameBackend`] behind the
//! interactive frame loop. It owns:
//!
//! - One [`FrameSync`] per frame-in-flight slot
//! - The swapchain and its image views
//! - One offscreen viewport [`ColorImage`] per swapchain image
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on the slot's in-flight fence (CPU waits for the slot's last use)
//! 2. Acquire a swapchain image (signals image_available)
//! 3. Submit the scene and overlay command buffers:
//!    - Wait on image_available at color output and transfer
//!    - Signal render_finished
//!    - Signal the in-flight fence
//! 4. Present (waits on render_finished)
//! ```
//!
//! The swapchain borrows the surface of the [`GpuContext`] it was created
//! from; the context must outlive the frame manager.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use pacer_rhi::device::Device;
use pacer_rhi::image::{ColorImage, VIEWPORT_IMAGE_USAGE};
use pacer_rhi::swapchain::{AcquireOutcome, PresentOutcome, RecreateOutcome, Swapchain};
use pacer_rhi::sync::FrameSync;
use pacer_rhi::{RhiError, RhiResult};

use crate::backend::FrameBackend;
use crate::context::GpuContext;
use crate::overlay::SWAPCHAIN_RELEASE_STAGES;
use crate::render_target::RenderTargetDesc;

/// Per-slot synchronization, the swapchain and the viewport images.
///
/// # Thread Safety
///
/// The frame manager is not thread-safe. It should only be accessed
/// from the render thread.
pub struct FrameManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Offscreen images the scene renders into, one per swapchain image.
    viewport_images: Vec<ColorImage>,
    viewport_target: RenderTargetDesc,
    swapchain: Swapchain,
    surface_target: RenderTargetDesc,
    /// Per-slot semaphores and fences.
    frames: Vec<FrameSync>,
}

impl FrameManager {
    /// Creates `frames_in_flight` slots, a swapchain for `framebuffer` and
    /// viewport images at `viewport`.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        context: &GpuContext,
        frames_in_flight: usize,
        framebuffer: vk::Extent2D,
        viewport: vk::Extent2D,
    ) -> RhiResult<Self> {
        let device = context.device().clone();

        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        let swapchain = Swapchain::new(
            context.instance(),
            device.clone(),
            context.surface().handle(),
            framebuffer.width,
            framebuffer.height,
        )?;
        let surface_target = describe_swapchain(&swapchain);

        let mut this = Self {
            device,
            viewport_images: Vec::new(),
            viewport_target: RenderTargetDesc::default(),
            swapchain,
            surface_target,
            frames,
        };
        this.build_viewport_images(viewport)?;

        info!(
            "Frame manager created with {} frames in flight, {} swapchain images",
            frames_in_flight,
            this.swapchain.image_count()
        );

        Ok(this)
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the swapchain.
    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    fn frame(&self, slot: usize) -> RhiResult<&FrameSync> {
        self.frames.get(slot).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "frame slot {} out of range ({} slots)",
                slot,
                self.frames.len()
            ))
        })
    }

    fn build_viewport_images(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        // Old images are unreferenced: every slot fence has been waited.
        self.viewport_images.clear();

        let format = self.swapchain.format();
        for _ in 0..self.swapchain.image_count() {
            let image = ColorImage::new(self.device.clone(), extent, format, VIEWPORT_IMAGE_USAGE)?;
            self.viewport_images.push(image);
        }

        self.viewport_target = RenderTargetDesc {
            extent,
            format,
            images: self.viewport_images.iter().map(ColorImage::image).collect(),
            image_views: self
                .viewport_images
                .iter()
                .map(ColorImage::image_view)
                .collect(),
        };

        debug!(
            "Viewport images built: {} x {}x{}",
            self.viewport_images.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }
}

impl FrameBackend for FrameManager {
    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn wait_for_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frame(slot)?.in_flight().wait()
    }

    fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frame(slot)?.in_flight().reset()
    }

    fn is_fence_signaled(&self, slot: usize) -> RhiResult<bool> {
        self.frame(slot)?.in_flight().is_signaled()
    }

    fn acquire_next_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.frame(slot)?.image_available().handle();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn release_acquired_image(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frame(slot)?;

        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);

        // SAFETY: The semaphore was signaled by the acquire and is waited
        // exactly once here. The caller reset the fence.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight().handle())?;
        }

        debug!("Released acquired image of slot {}", slot);
        Ok(())
    }

    fn submit(&mut self, slot: usize, command_buffers: &[vk::CommandBuffer]) -> RhiResult<()> {
        let frame = self.frame(slot)?;

        let wait_semaphores = [frame.image_available().handle()];
        // The overlay writes the swapchain image with transfers.
        let wait_stages = [submit_wait_stages()];
        let signal_semaphores = [frame.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: The command buffers were fully recorded this frame, the
        // semaphore was signaled by this slot's acquire, and the fence was
        // reset after its wait.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight().handle())?;
        }

        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let semaphore = self.frame(slot)?.render_finished().handle();
        self.swapchain
            .present(self.device.present_queue(), image_index, semaphore)
    }

    fn recreate_surface(&mut self, extent: vk::Extent2D) -> RhiResult<Option<RenderTargetDesc>> {
        match self.swapchain.recreate(extent.width, extent.height)? {
            RecreateOutcome::Recreated => {
                self.surface_target = describe_swapchain(&self.swapchain);
                Ok(Some(self.surface_target.clone()))
            }
            RecreateOutcome::ZeroExtent => Ok(None),
        }
    }

    fn recreate_viewport(&mut self, extent: vk::Extent2D) -> RhiResult<RenderTargetDesc> {
        self.build_viewport_images(extent)?;
        Ok(self.viewport_target.clone())
    }

    fn surface_target(&self) -> &RenderTargetDesc {
        &self.surface_target
    }

    fn viewport_target(&self) -> &RenderTargetDesc {
        &self.viewport_target
    }
}

/// [`SWAPCHAIN_RELEASE_STAGES`] as legacy stage flags; the low bits match.
fn submit_wait_stages() -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::from_raw(SWAPCHAIN_RELEASE_STAGES.as_raw() as u32)
}

fn describe_swapchain(swapchain: &Swapchain) -> RenderTargetDesc {
    RenderTargetDesc {
        extent: swapchain.extent(),
        format: swapchain.format(),
        images: swapchain.images().to_vec(),
        image_views: swapchain.image_views().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_manager_is_send() {
        // Compile-time check that FrameManager is Send
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }

    #[test]
    fn test_submit_waits_where_swapchain_transition_starts() {
        assert_eq!(
            submit_wait_stages(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER
        );
        assert_eq!(
            submit_wait_stages().as_raw() as u64,
            SWAPCHAIN_RELEASE_STAGES.as_raw()
        );
    }
}
