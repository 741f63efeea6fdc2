//! Frame orchestration.
//!
//! [`RenderingLayer`] runs the frames-in-flight loop on top of a
//! [`FrameBackend`], one scene [`CommandBufferRecorder`] and one
//! [`ViewportOverlay`]. It decides every frame whether to render or to skip
//! while it rebuilds the surface or the viewport.
//!
//! # Frame Flow
//!
//! ```text
//! begin_frame
//!   overlay.layout()                     desired viewport size
//!   window resize pending?               -> recover surface, skip
//!   surface stale and not yet rebuilt?   -> retry recovery, skip
//!   viewport size changed?               -> rebuild viewport, skip
//!   wait slot fence
//!   acquire image
//!     OutOfDate                          -> recover surface, skip
//!     Suboptimal                         -> release image, recover surface, skip
//!     Acquired(i)                        -> reset fence, recorders begin_frame(slot)
//! end_frame
//!   record scene, then overlay
//!   submit (waits image-available, signals render-finished + fence)
//!   clear accumulation
//!   present
//!     Stale                              -> recover surface, same slot next frame
//!     Presented                          -> next slot
//! ```
//!
//! A skipped frame does no GPU work; `end_frame` only clears what was drawn.
//!
//! Surface recovery asks the overlay for its layout again once it has seen
//! the new surface, so a window resize rebuilds the viewport once and costs
//! a single frame. While the surface has zero area recovery is deferred and
//! frames are skipped as [`SkipReason::WindowMinimized`].

use ash::vk;
use tracing::{debug, error, trace, warn};

use pacer_platform::PendingResize;
use pacer_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use pacer_rhi::{RhiError, RhiResult};

use crate::backend::{CommandBufferRecorder, FrameBackend, ViewportOverlay};

/// Result of [`RenderingLayer::begin_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStart {
    /// An image was acquired; this frame will be recorded and presented.
    Acquired { slot: usize, image_index: u32 },
    /// No GPU work happens this frame.
    Skipped(SkipReason),
}

impl FrameStart {
    /// True when the frame will be rendered.
    #[inline]
    pub fn is_acquired(&self) -> bool {
        matches!(self, FrameStart::Acquired { .. })
    }
}

/// Why a frame was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The window has zero area, e.g. while minimized.
    WindowMinimized,
    /// The window framebuffer changed size; the surface was rebuilt.
    WindowResized,
    /// The viewport panel changed size; the viewport images were rebuilt.
    ViewportResized,
    /// Acquire reported the surface out of date; the surface was rebuilt.
    SurfaceOutOfDate,
    /// Acquire reported the surface suboptimal; the surface was rebuilt.
    SurfaceSuboptimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameState {
    Idle,
    ImageAcquired { slot: usize, image_index: u32 },
    ResizePending,
}

/// Owns the backend, the scene recorder and the overlay, and sequences them
/// into frames.
///
/// # Thread Safety
///
/// Single-threaded. Only the [`PendingResize`] mailbox may be written from
/// elsewhere.
pub struct RenderingLayer<B, R, O>
where
    B: FrameBackend,
    R: CommandBufferRecorder,
    O: ViewportOverlay,
{
    backend: B,
    recorder: R,
    overlay: O,
    pending_resize: PendingResize,
    /// Last framebuffer size the surface was built for.
    framebuffer_extent: vk::Extent2D,
    /// Size the viewport images were last built at.
    viewport_extent: vk::Extent2D,
    /// The swapchain must be rebuilt before the next acquire.
    surface_stale: bool,
    current_slot: usize,
    state: FrameState,
}

impl<B, R, O> RenderingLayer<B, R, O>
where
    B: FrameBackend,
    R: CommandBufferRecorder,
    O: ViewportOverlay,
{
    /// Creates the layer and hands both current render targets to the
    /// recorder and the overlay.
    ///
    /// `pending_resize` is the mailbox the window posts framebuffer resizes to.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameOrder`] if the backend has no slots.
    pub fn new(
        backend: B,
        mut recorder: R,
        mut overlay: O,
        pending_resize: PendingResize,
    ) -> RhiResult<Self> {
        if backend.frames_in_flight() == 0 {
            return Err(RhiError::FrameOrder(
                "frame backend has no frame-in-flight slots".to_string(),
            ));
        }

        let surface = backend.surface_target();
        let viewport = backend.viewport_target();

        recorder.on_surface_resized(surface);
        overlay.on_surface_resized(surface);
        recorder.on_viewport_resized(viewport);
        overlay.on_viewport_resized(viewport);

        debug!(
            "Rendering layer ready: {} slots, surface {}x{}, viewport {}x{}",
            backend.frames_in_flight(),
            surface.extent.width,
            surface.extent.height,
            viewport.extent.width,
            viewport.extent.height
        );

        let framebuffer_extent = surface.extent;
        let viewport_extent = viewport.extent;

        Ok(Self {
            backend,
            recorder,
            overlay,
            pending_resize,
            framebuffer_extent,
            viewport_extent,
            surface_stale: false,
            current_slot: 0,
            state: FrameState::Idle,
        })
    }

    /// Starts a frame.
    ///
    /// Returns [`FrameStart::Skipped`] when the frame was spent rebuilding
    /// render targets; drawing is still allowed and is discarded at
    /// [`end_frame`](Self::end_frame).
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameOrder`] if a frame is already open, or any
    /// backend or recorder error.
    pub fn begin_frame(&mut self) -> RhiResult<FrameStart> {
        if self.state != FrameState::Idle {
            return Err(RhiError::FrameOrder(
                "begin_frame called while a frame is open".to_string(),
            ));
        }

        let desired_viewport = self.overlay.layout();

        if let Some(resize) = self
            .pending_resize
            .take_if(|event| !event.is_zero_area())
        {
            self.state = FrameState::ResizePending;
            self.framebuffer_extent = vk::Extent2D {
                width: resize.width,
                height: resize.height,
            };
            return self.recover_and_skip(SkipReason::WindowResized);
        }

        if self.pending_resize.is_pending() {
            trace!("Framebuffer has zero area, skipping frame");
            self.state = FrameState::ResizePending;
            return Ok(FrameStart::Skipped(SkipReason::WindowMinimized));
        }

        if self.surface_stale {
            self.state = FrameState::ResizePending;
            return self.recover_and_skip(SkipReason::WindowResized);
        }

        if !is_zero_area(desired_viewport) && desired_viewport != self.viewport_extent {
            self.state = FrameState::ResizePending;
            self.rebuild_viewport(desired_viewport)?;
            return Ok(FrameStart::Skipped(SkipReason::ViewportResized));
        }

        let slot = self.current_slot;
        self.backend.wait_for_fence(slot)?;

        match self.backend.acquire_next_image(slot)? {
            AcquireOutcome::Acquired(image_index) => {
                self.backend.reset_fence(slot)?;
                self.state = FrameState::ImageAcquired { slot, image_index };
                self.recorder.begin_frame(slot)?;
                self.overlay.begin_frame(slot)?;
                trace!("Frame started: slot {}, image {}", slot, image_index);
                Ok(FrameStart::Acquired { slot, image_index })
            }
            AcquireOutcome::Suboptimal(image_index) => {
                debug!("Acquired image {} is suboptimal, rebuilding surface", image_index);
                self.state = FrameState::ResizePending;
                self.backend.reset_fence(slot)?;
                self.backend.release_acquired_image(slot)?;
                self.recover_and_skip(SkipReason::SurfaceSuboptimal)
            }
            AcquireOutcome::OutOfDate => {
                debug!("Surface out of date during acquire, rebuilding");
                self.state = FrameState::ResizePending;
                self.recover_and_skip(SkipReason::SurfaceOutOfDate)
            }
        }
    }

    /// Finishes the frame started by [`begin_frame`](Self::begin_frame).
    ///
    /// Accumulated draws are cleared whether or not the frame was rendered.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FrameOrder`] without an open frame, or any
    /// recording, submission or presentation error.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        match std::mem::replace(&mut self.state, FrameState::Idle) {
            FrameState::Idle => Err(RhiError::FrameOrder(
                "end_frame called without begin_frame".to_string(),
            )),
            FrameState::ResizePending => {
                self.clear_accumulation();
                Ok(())
            }
            FrameState::ImageAcquired { slot, image_index } => {
                let submitted = match self.record(image_index) {
                    Ok(command_buffers) => self.backend.submit(slot, &command_buffers),
                    Err(e) => {
                        // The fence was reset at acquire; signal it so later waits return.
                        if let Err(release) = self.backend.release_acquired_image(slot) {
                            warn!("Failed to release image after recording error: {}", release);
                        }
                        Err(e)
                    }
                };
                self.clear_accumulation();
                submitted?;

                match self.backend.present(slot, image_index)? {
                    PresentOutcome::Presented => {
                        self.current_slot = (slot + 1) % self.backend.frames_in_flight();
                    }
                    PresentOutcome::Stale => {
                        debug!("Surface stale after present, rebuilding");
                        self.recover_surface()?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Runs one whole frame: `begin_frame`, then `draw` with the scene
    /// recorder when an image was acquired, then `end_frame`.
    ///
    /// `end_frame` runs for skipped frames too, so the layer is idle again
    /// whenever this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`begin_frame`](Self::begin_frame) or
    /// [`end_frame`](Self::end_frame).
    pub fn render_frame<F>(&mut self, draw: F) -> RhiResult<FrameStart>
    where
        F: FnOnce(&mut R),
    {
        let start = self.begin_frame()?;
        match start {
            FrameStart::Acquired { .. } => draw(&mut self.recorder),
            FrameStart::Skipped(reason) => trace!("Frame skipped: {:?}", reason),
        }
        self.end_frame()?;
        Ok(start)
    }

    /// Blocks until every slot's submitted work has completed.
    ///
    /// Call before tearing down anything the GPU may still read.
    ///
    /// # Errors
    ///
    /// Returns an error if polling or waiting on a fence fails.
    pub fn wait_rendering_idle(&mut self) -> RhiResult<()> {
        for slot in 0..self.backend.frames_in_flight() {
            if !self.backend.is_fence_signaled(slot)? {
                self.backend.wait_for_fence(slot)?;
            }
        }
        Ok(())
    }

    /// The scene recorder, for drawing and camera updates.
    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.recorder
    }

    /// The scene recorder.
    #[inline]
    pub fn renderer(&self) -> &R {
        &self.recorder
    }

    #[inline]
    pub fn overlay_mut(&mut self) -> &mut O {
        &mut self.overlay
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Slot the next acquired frame will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Size the viewport images were last built at.
    #[inline]
    pub fn viewport_extent(&self) -> vk::Extent2D {
        self.viewport_extent
    }

    /// Last framebuffer size the surface was built for.
    #[inline]
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        self.framebuffer_extent
    }

    /// True while the swapchain is out of date and waits for a non-zero
    /// surface to be rebuilt.
    #[inline]
    pub fn is_surface_stale(&self) -> bool {
        self.surface_stale
    }

    /// True between `begin_frame` and `end_frame`.
    #[inline]
    pub fn is_frame_open(&self) -> bool {
        self.state != FrameState::Idle
    }

    fn record(&mut self, image_index: u32) -> RhiResult<[vk::CommandBuffer; 2]> {
        let scene = self.recorder.record_command_buffer(image_index)?;
        let overlay = self.overlay.record_command_buffer(image_index)?;
        Ok([scene, overlay])
    }

    fn clear_accumulation(&mut self) {
        self.recorder.end_frame();
        self.overlay.end_frame();
    }

    /// Skips the frame with `reason` after rebuilding the surface, or as
    /// [`SkipReason::WindowMinimized`] when the surface has zero area.
    fn recover_and_skip(&mut self, reason: SkipReason) -> RhiResult<FrameStart> {
        if self.recover_surface()? {
            Ok(FrameStart::Skipped(reason))
        } else {
            Ok(FrameStart::Skipped(SkipReason::WindowMinimized))
        }
    }

    /// Rebuilds the swapchain at the last known framebuffer size, tells the
    /// recorder and the overlay, then rebuilds the viewport at the size the
    /// overlay lays out for the new surface.
    ///
    /// Returns `false` and marks the surface stale when it has zero area.
    fn recover_surface(&mut self) -> RhiResult<bool> {
        self.wait_rendering_idle()?;

        let Some(surface) = self.backend.recreate_surface(self.framebuffer_extent)? else {
            trace!("Surface has zero area, deferring rebuild");
            self.surface_stale = true;
            return Ok(false);
        };
        self.surface_stale = false;

        self.recorder.on_surface_resized(&surface);
        self.overlay.on_surface_resized(&surface);

        let desired_viewport = self.overlay.layout();
        let viewport_extent = if is_zero_area(desired_viewport) {
            self.viewport_extent
        } else {
            desired_viewport
        };
        let viewport = self.backend.recreate_viewport(viewport_extent)?;
        self.viewport_extent = viewport.extent;

        self.recorder.on_viewport_resized(&viewport);
        self.overlay.on_viewport_resized(&viewport);

        debug!(
            "Surface rebuilt at {}x{} ({} images), viewport {}x{}",
            surface.extent.width,
            surface.extent.height,
            surface.image_count(),
            viewport.extent.width,
            viewport.extent.height
        );
        Ok(true)
    }

    fn rebuild_viewport(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.wait_rendering_idle()?;

        let viewport = self.backend.recreate_viewport(extent)?;
        self.viewport_extent = viewport.extent;

        self.recorder.on_viewport_resized(&viewport);
        self.overlay.on_viewport_resized(&viewport);

        debug!(
            "Viewport rebuilt at {}x{}",
            viewport.extent.width, viewport.extent.height
        );
        Ok(())
    }
}

impl<B, R, O> Drop for RenderingLayer<B, R, O>
where
    B: FrameBackend,
    R: CommandBufferRecorder,
    O: ViewportOverlay,
{
    fn drop(&mut self) {
        // An acquired frame that never reached end_frame left its fence reset.
        if let FrameState::ImageAcquired { slot, .. } = self.state {
            if let Err(e) = self.backend.release_acquired_image(slot) {
                error!("Failed to release open frame during drop: {}", e);
            }
            self.clear_accumulation();
        }

        if let Err(e) = self.wait_rendering_idle() {
            error!("Failed to wait for rendering idle during drop: {}", e);
        }
    }
}

#[inline]
fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
