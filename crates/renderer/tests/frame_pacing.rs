//! Drives `RenderingLayer` through mock backends, without a GPU.

use std::collections::{HashSet, VecDeque};

use ash::vk;
use ash::vk::Handle;

use pacer_platform::{FramebufferResized, PendingResize};
use pacer_renderer::{
    CommandBufferRecorder, FrameBackend, FrameStart, RenderTargetDesc, RenderingLayer, SkipReason,
    ViewportOverlay,
};
use pacer_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use pacer_rhi::{RhiError, RhiResult};

const SCENE_BUFFER: u64 = 0x100;
const OVERLAY_BUFFER: u64 = 0x200;

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    Wait(usize),
    Reset(usize),
    Acquire(usize),
    Release(usize),
    Submit(usize, Vec<vk::CommandBuffer>),
    Present(usize, u32),
    RecreateSurface(vk::Extent2D),
    SurfaceUnavailable,
    RecreateViewport(vk::Extent2D),
}

/// Fence model: a submission (or release) queues work on the slot; the GPU
/// finishes queued work in order. A fence is signaled only once its work
/// finished, either because the layer waited on it or because the test
/// called `finish_all`. Waiting on a fence no queued work will signal is an
/// error, as it would hang forever.
struct MockBackend {
    signaled: Vec<bool>,
    gpu_queue: VecDeque<usize>,
    max_in_flight: usize,
    image_count: u32,
    next_image: u32,
    next_handle: u64,
    zero_area_surface: bool,
    surface: RenderTargetDesc,
    viewport: RenderTargetDesc,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    events: Vec<Event>,
}

impl MockBackend {
    fn new(frames: usize, framebuffer: vk::Extent2D, viewport: vk::Extent2D) -> Self {
        let mut backend = Self {
            signaled: vec![true; frames],
            gpu_queue: VecDeque::new(),
            max_in_flight: 0,
            image_count: 3,
            next_image: 0,
            next_handle: 1,
            zero_area_surface: false,
            surface: RenderTargetDesc::default(),
            viewport: RenderTargetDesc::default(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            events: Vec::new(),
        };
        backend.surface = backend.fresh_target(framebuffer);
        backend.viewport = backend.fresh_target(viewport);
        backend
    }

    fn fresh_target(&mut self, extent: vk::Extent2D) -> RenderTargetDesc {
        let mut desc = RenderTargetDesc {
            extent,
            format: vk::Format::B8G8R8A8_UNORM,
            ..Default::default()
        };
        for _ in 0..self.image_count {
            desc.images.push(vk::Image::from_raw(self.next_handle));
            desc.image_views
                .push(vk::ImageView::from_raw(self.next_handle + 1));
            self.next_handle += 2;
        }
        desc
    }

    /// The GPU catches up with everything queued.
    fn finish_all(&mut self) {
        while let Some(slot) = self.gpu_queue.pop_front() {
            self.signaled[slot] = true;
        }
    }

    fn queue_work(&mut self, slot: usize) {
        self.gpu_queue.push_back(slot);
        self.max_in_flight = self.max_in_flight.max(self.gpu_queue.len());
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }

    fn submissions(&self) -> Vec<(usize, Vec<vk::CommandBuffer>)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Submit(slot, buffers) => Some((*slot, buffers.clone())),
                _ => None,
            })
            .collect()
    }

    fn viewport_rebuilds(&self) -> Vec<vk::Extent2D> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::RecreateViewport(extent) => Some(*extent),
                _ => None,
            })
            .collect()
    }
}

impl FrameBackend for MockBackend {
    fn frames_in_flight(&self) -> usize {
        self.signaled.len()
    }

    fn wait_for_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.events.push(Event::Wait(slot));
        if self.signaled[slot] {
            return Ok(());
        }
        if !self.gpu_queue.contains(&slot) {
            return Err(RhiError::FrameOrder(format!(
                "fence {} is unsignaled with no work queued to signal it",
                slot
            )));
        }
        // Blocks until the GPU finished this slot's work and everything before it.
        while let Some(done) = self.gpu_queue.pop_front() {
            self.signaled[done] = true;
            if done == slot {
                break;
            }
        }
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
        if !self.signaled[slot] {
            return Err(RhiError::FrameOrder(format!(
                "fence {} reset while its work is still running",
                slot
            )));
        }
        self.events.push(Event::Reset(slot));
        self.signaled[slot] = false;
        Ok(())
    }

    fn is_fence_signaled(&self, slot: usize) -> RhiResult<bool> {
        Ok(self.signaled[slot])
    }

    fn acquire_next_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        self.events.push(Event::Acquire(slot));
        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Acquired(index))
    }

    fn release_acquired_image(&mut self, slot: usize) -> RhiResult<()> {
        if self.signaled[slot] || self.gpu_queue.contains(&slot) {
            return Err(RhiError::FrameOrder(format!(
                "release on slot {} without a freshly reset fence",
                slot
            )));
        }
        self.events.push(Event::Release(slot));
        self.queue_work(slot);
        Ok(())
    }

    fn submit(&mut self, slot: usize, command_buffers: &[vk::CommandBuffer]) -> RhiResult<()> {
        if self.signaled[slot] || self.gpu_queue.contains(&slot) {
            return Err(RhiError::FrameOrder(format!(
                "submit on slot {} without a freshly reset fence",
                slot
            )));
        }
        self.events
            .push(Event::Submit(slot, command_buffers.to_vec()));
        self.queue_work(slot);
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        self.events.push(Event::Present(slot, image_index));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn recreate_surface(&mut self, extent: vk::Extent2D) -> RhiResult<Option<RenderTargetDesc>> {
        assert!(self.gpu_queue.is_empty(), "surface rebuilt with work in flight");
        if self.zero_area_surface {
            self.events.push(Event::SurfaceUnavailable);
            return Ok(None);
        }
        self.events.push(Event::RecreateSurface(extent));
        self.surface = self.fresh_target(extent);
        self.next_image = 0;
        Ok(Some(self.surface.clone()))
    }

    fn recreate_viewport(&mut self, extent: vk::Extent2D) -> RhiResult<RenderTargetDesc> {
        assert!(self.gpu_queue.is_empty(), "viewport rebuilt with work in flight");
        self.events.push(Event::RecreateViewport(extent));
        self.viewport = self.fresh_target(extent);
        Ok(self.viewport.clone())
    }

    fn surface_target(&self) -> &RenderTargetDesc {
        &self.surface
    }

    fn viewport_target(&self) -> &RenderTargetDesc {
        &self.viewport
    }
}

/// Serves as both the scene recorder and the overlay.
struct MockRecorder {
    handle_base: u64,
    desired_viewport: vk::Extent2D,
    /// Lays the viewport out as the surface divided by this, like an overlay
    /// that sizes its panel from the window.
    surface_divisor: Option<u32>,
    slot: Option<usize>,
    pending_draws: usize,
    recorded_draws: Vec<usize>,
    fail_next_record: bool,
    begun: Vec<usize>,
    recorded_extents: Vec<vk::Extent2D>,
    end_frames: usize,
    surface: RenderTargetDesc,
    viewport: RenderTargetDesc,
    seen_surfaces: Vec<RenderTargetDesc>,
}

impl MockRecorder {
    fn new(handle_base: u64, desired_viewport: vk::Extent2D) -> Self {
        Self {
            handle_base,
            desired_viewport,
            surface_divisor: None,
            slot: None,
            pending_draws: 0,
            recorded_draws: Vec::new(),
            fail_next_record: false,
            begun: Vec::new(),
            recorded_extents: Vec::new(),
            end_frames: 0,
            surface: RenderTargetDesc::default(),
            viewport: RenderTargetDesc::default(),
            seen_surfaces: Vec::new(),
        }
    }

    fn sized_from_surface(handle_base: u64, divisor: u32) -> Self {
        let mut recorder = Self::new(handle_base, extent(0, 0));
        recorder.surface_divisor = Some(divisor);
        recorder
    }

    fn draw(&mut self) {
        self.pending_draws += 1;
    }
}

impl CommandBufferRecorder for MockRecorder {
    fn begin_frame(&mut self, slot: usize) -> RhiResult<()> {
        self.slot = Some(slot);
        self.begun.push(slot);
        Ok(())
    }

    fn record_command_buffer(&mut self, image_index: u32) -> RhiResult<vk::CommandBuffer> {
        let slot = self
            .slot
            .ok_or_else(|| RhiError::FrameOrder("record outside frame".to_string()))?;
        if std::mem::take(&mut self.fail_next_record) {
            return Err(RhiError::OutOfBounds("scripted failure".to_string()));
        }
        assert!(self.viewport.get(image_index).is_some());
        self.recorded_extents.push(self.viewport.extent);
        self.recorded_draws.push(self.pending_draws);
        Ok(vk::CommandBuffer::from_raw(self.handle_base + slot as u64))
    }

    fn end_frame(&mut self) {
        self.pending_draws = 0;
        self.slot = None;
        self.end_frames += 1;
    }

    fn on_surface_resized(&mut self, target: &RenderTargetDesc) {
        self.surface = target.clone();
        self.seen_surfaces.push(target.clone());
    }

    fn on_viewport_resized(&mut self, target: &RenderTargetDesc) {
        self.viewport = target.clone();
    }
}

impl ViewportOverlay for MockRecorder {
    fn layout(&mut self) -> vk::Extent2D {
        match self.surface_divisor {
            Some(divisor) => extent(
                self.surface.extent.width / divisor,
                self.surface.extent.height / divisor,
            ),
            None => self.desired_viewport,
        }
    }
}

type MockLayer = RenderingLayer<MockBackend, MockRecorder, MockRecorder>;

fn layer_with(frames: usize, viewport: vk::Extent2D) -> (MockLayer, PendingResize) {
    let pending = PendingResize::new();
    let layer = RenderingLayer::new(
        MockBackend::new(frames, extent(1280, 720), viewport),
        MockRecorder::new(SCENE_BUFFER, viewport),
        MockRecorder::new(OVERLAY_BUFFER, viewport),
        pending.clone(),
    )
    .unwrap();
    (layer, pending)
}

fn run_frame(layer: &mut MockLayer) -> FrameStart {
    let start = layer.begin_frame().unwrap();
    layer.end_frame().unwrap();
    start
}

/// One iteration of the host loop: draw two primitives into whatever frame
/// the layer hands out.
fn host_frame(layer: &mut MockLayer) -> RhiResult<FrameStart> {
    layer.render_frame(|scene| {
        scene.draw();
        scene.draw();
    })
}

fn skips(starts: &[FrameStart]) -> Vec<SkipReason> {
    starts
        .iter()
        .filter_map(|start| match start {
            FrameStart::Skipped(reason) => Some(*reason),
            FrameStart::Acquired { .. } => None,
        })
        .collect()
}

#[test]
fn test_three_empty_frames_cycle_slots() {
    let (mut layer, _) = layer_with(2, extent(800, 600));

    let slots: Vec<usize> = (0..3)
        .map(|_| match run_frame(&mut layer) {
            FrameStart::Acquired { slot, .. } => slot,
            FrameStart::Skipped(reason) => panic!("unexpected skip: {:?}", reason),
        })
        .collect();

    assert_eq!(slots, vec![0, 1, 0]);

    let waits: Vec<usize> = layer
        .backend()
        .events
        .iter()
        .filter_map(|event| match event {
            Event::Wait(slot) => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![0, 1, 0]);
    assert_eq!(layer.backend().count(|e| matches!(e, Event::Present(..))), 3);
}

#[test]
fn test_scene_buffer_is_submitted_before_overlay() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    run_frame(&mut layer);
    run_frame(&mut layer);

    assert_eq!(
        layer.backend().submissions(),
        vec![
            (
                0,
                vec![
                    vk::CommandBuffer::from_raw(SCENE_BUFFER),
                    vk::CommandBuffer::from_raw(OVERLAY_BUFFER)
                ]
            ),
            (
                1,
                vec![
                    vk::CommandBuffer::from_raw(SCENE_BUFFER + 1),
                    vk::CommandBuffer::from_raw(OVERLAY_BUFFER + 1)
                ]
            ),
        ]
    );
}

#[test]
fn test_viewport_resize_skips_one_frame() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    assert!(run_frame(&mut layer).is_acquired());

    layer.overlay_mut().desired_viewport = extent(400, 300);
    let acquires_before = layer.backend().count(|e| matches!(e, Event::Acquire(_)));
    let submits_before = layer.backend().submissions().len();

    assert_eq!(
        layer.begin_frame().unwrap(),
        FrameStart::Skipped(SkipReason::ViewportResized)
    );
    layer.end_frame().unwrap();

    let backend = layer.backend();
    assert_eq!(backend.count(|e| matches!(e, Event::Acquire(_))), acquires_before);
    assert_eq!(backend.submissions().len(), submits_before);
    assert_eq!(backend.count(|e| matches!(e, Event::RecreateSurface(_))), 0);
    assert!(backend.events.contains(&Event::RecreateViewport(extent(400, 300))));

    assert!(run_frame(&mut layer).is_acquired());
    assert_eq!(layer.viewport_extent(), extent(400, 300));
    assert_eq!(
        layer.renderer().recorded_extents.last(),
        Some(&extent(400, 300))
    );
}

#[test]
fn test_zero_viewport_layout_is_ignored() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    layer.overlay_mut().desired_viewport = extent(0, 0);

    assert!(run_frame(&mut layer).is_acquired());
    assert_eq!(layer.viewport_extent(), extent(800, 600));
}

#[test]
fn test_window_resize_rebuilds_surface_then_renders() {
    let (mut layer, pending) = layer_with(2, extent(800, 600));
    run_frame(&mut layer);

    pending.post(FramebufferResized::new(1024, 768));
    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Skipped(SkipReason::WindowResized)
    );

    let backend = layer.backend();
    let rebuilds: Vec<&Event> = backend
        .events
        .iter()
        .filter(|e| matches!(e, Event::RecreateSurface(_) | Event::RecreateViewport(_)))
        .collect();
    assert_eq!(
        rebuilds,
        vec![
            &Event::RecreateSurface(extent(1024, 768)),
            &Event::RecreateViewport(extent(800, 600))
        ]
    );
    assert_eq!(layer.renderer().surface.extent, extent(1024, 768));
    assert_eq!(layer.framebuffer_extent(), extent(1024, 768));

    assert!(run_frame(&mut layer).is_acquired());
}

#[test]
fn test_window_resize_relayouts_viewport_in_the_same_frame() {
    let pending = PendingResize::new();
    let mut layer = RenderingLayer::new(
        MockBackend::new(2, extent(1280, 720), extent(640, 360)),
        MockRecorder::new(SCENE_BUFFER, extent(640, 360)),
        MockRecorder::sized_from_surface(OVERLAY_BUFFER, 2),
        pending.clone(),
    )
    .unwrap();
    assert!(host_frame(&mut layer).unwrap().is_acquired());

    pending.post(FramebufferResized::new(1024, 768));
    let starts: Vec<FrameStart> = (0..3).map(|_| host_frame(&mut layer).unwrap()).collect();

    assert_eq!(skips(&starts), vec![SkipReason::WindowResized]);
    assert_eq!(layer.backend().viewport_rebuilds(), vec![extent(512, 384)]);
    assert_eq!(layer.viewport_extent(), extent(512, 384));
    assert_eq!(
        layer.renderer().recorded_extents.last(),
        Some(&extent(512, 384))
    );
}

#[test]
fn test_host_loop_survives_every_kind_of_skip() {
    let (mut layer, pending) = layer_with(2, extent(800, 600));
    assert!(host_frame(&mut layer).unwrap().is_acquired());

    pending.post(FramebufferResized::new(1024, 768));
    assert_eq!(
        host_frame(&mut layer).unwrap(),
        FrameStart::Skipped(SkipReason::WindowResized)
    );
    assert!(!layer.is_frame_open());
    assert!(host_frame(&mut layer).unwrap().is_acquired());

    layer.overlay_mut().desired_viewport = extent(400, 300);
    assert_eq!(
        host_frame(&mut layer).unwrap(),
        FrameStart::Skipped(SkipReason::ViewportResized)
    );
    assert!(host_frame(&mut layer).unwrap().is_acquired());

    layer
        .backend_mut()
        .acquire_script
        .push_back(AcquireOutcome::OutOfDate);
    assert_eq!(
        host_frame(&mut layer).unwrap(),
        FrameStart::Skipped(SkipReason::SurfaceOutOfDate)
    );
    assert!(host_frame(&mut layer).unwrap().is_acquired());

    pending.post(FramebufferResized::new(0, 0));
    assert_eq!(
        host_frame(&mut layer).unwrap(),
        FrameStart::Skipped(SkipReason::WindowMinimized)
    );
    pending.post(FramebufferResized::new(800, 600));
    assert_eq!(
        host_frame(&mut layer).unwrap(),
        FrameStart::Skipped(SkipReason::WindowResized)
    );
    assert!(host_frame(&mut layer).unwrap().is_acquired());

    // Draws only reach acquired frames; every frame ends.
    assert!(layer.renderer().recorded_draws.iter().all(|&draws| draws == 2));
    assert_eq!(layer.renderer().recorded_draws.len(), 5);
    assert_eq!(layer.renderer().end_frames, 10);
    assert!(!layer.is_frame_open());
}

#[test]
fn test_minimized_window_stays_pending() {
    let (mut layer, pending) = layer_with(2, extent(800, 600));

    pending.post(FramebufferResized::new(0, 0));
    for _ in 0..3 {
        assert_eq!(
            run_frame(&mut layer),
            FrameStart::Skipped(SkipReason::WindowMinimized)
        );
    }
    assert!(pending.is_pending());
    assert_eq!(
        layer.backend().count(|e| matches!(e, Event::RecreateSurface(_))),
        0
    );
    assert_eq!(layer.backend().count(|e| matches!(e, Event::Acquire(_))), 0);

    pending.post(FramebufferResized::new(640, 480));
    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Skipped(SkipReason::WindowResized)
    );
    assert!(!pending.is_pending());
    assert!(run_frame(&mut layer).is_acquired());
}

#[test]
fn test_stale_present_on_zero_area_surface_defers_rebuild() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    layer.backend_mut().zero_area_surface = true;
    layer
        .backend_mut()
        .present_script
        .push_back(PresentOutcome::Stale);

    assert!(run_frame(&mut layer).is_acquired());
    assert!(layer.is_surface_stale());

    let acquires = layer.backend().count(|e| matches!(e, Event::Acquire(_)));
    for _ in 0..3 {
        assert_eq!(
            run_frame(&mut layer),
            FrameStart::Skipped(SkipReason::WindowMinimized)
        );
    }
    let backend = layer.backend();
    assert_eq!(backend.count(|e| matches!(e, Event::Acquire(_))), acquires);
    assert_eq!(backend.count(|e| matches!(e, Event::RecreateSurface(_))), 0);
    assert_eq!(backend.count(|e| matches!(e, Event::RecreateViewport(_))), 0);

    layer.backend_mut().zero_area_surface = false;
    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Skipped(SkipReason::WindowResized)
    );
    assert!(!layer.is_surface_stale());
    assert!(layer.backend().events.contains(&Event::RecreateSurface(extent(1280, 720))));
    assert!(run_frame(&mut layer).is_acquired());
}

#[test]
fn test_out_of_date_on_zero_area_surface_skips_as_minimized() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    layer.backend_mut().zero_area_surface = true;
    layer
        .backend_mut()
        .acquire_script
        .push_back(AcquireOutcome::OutOfDate);

    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Skipped(SkipReason::WindowMinimized)
    );
    assert!(layer.is_surface_stale());
    assert!(layer.backend().events.contains(&Event::SurfaceUnavailable));
}

#[test]
fn test_resize_storm_converges_without_reusing_images() {
    let (mut layer, pending) = layer_with(2, extent(800, 600));
    let sizes = [(900, 700), (901, 701), (640, 480), (1920, 1080), (333, 222)];

    for (i, &(width, height)) in sizes.iter().enumerate() {
        pending.post(FramebufferResized::new(width, height));
        // Coalesce every other notification.
        if i % 2 == 0 {
            run_frame(&mut layer);
            run_frame(&mut layer);
        }
    }
    run_frame(&mut layer);
    assert!(run_frame(&mut layer).is_acquired());

    assert_eq!(layer.backend().surface.extent, extent(333, 222));
    assert_eq!(layer.renderer().surface.extent, extent(333, 222));

    let mut seen = HashSet::new();
    for surface in &layer.renderer().seen_surfaces {
        for image in &surface.images {
            assert!(seen.insert(image.as_raw()), "image handle reused");
        }
    }
    assert!(layer.renderer().seen_surfaces.len() > 1);
}

#[test]
fn test_out_of_date_acquire_recovers_on_same_slot() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    layer
        .backend_mut()
        .acquire_script
        .push_back(AcquireOutcome::OutOfDate);

    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Skipped(SkipReason::SurfaceOutOfDate)
    );
    let backend = layer.backend();
    assert_eq!(backend.count(|e| matches!(e, Event::Reset(_))), 0);
    assert!(backend.events.contains(&Event::RecreateSurface(extent(1280, 720))));

    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Acquired {
            slot: 0,
            image_index: 0
        }
    );
}

#[test]
fn test_suboptimal_acquire_releases_semaphore_before_rebuild() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    layer
        .backend_mut()
        .acquire_script
        .push_back(AcquireOutcome::Suboptimal(1));

    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Skipped(SkipReason::SurfaceSuboptimal)
    );

    let events = &layer.backend().events;
    let release = events.iter().position(|e| *e == Event::Release(0));
    let rebuild = events
        .iter()
        .position(|e| matches!(e, Event::RecreateSurface(_)));
    assert!(release.is_some());
    assert!(release < rebuild);
    assert!(layer.backend().signaled.iter().all(|&s| s));
    assert!(layer.renderer().begun.is_empty());
}

#[test]
fn test_stale_present_rebuilds_without_advancing() {
    let (mut layer, _) = layer_with(2, extent(800, 600));
    layer
        .backend_mut()
        .present_script
        .push_back(PresentOutcome::Stale);

    assert!(run_frame(&mut layer).is_acquired());
    assert_eq!(layer.current_slot(), 0);
    assert_eq!(
        layer.backend().count(|e| matches!(e, Event::RecreateSurface(_))),
        1
    );

    match run_frame(&mut layer) {
        FrameStart::Acquired { slot, .. } => assert_eq!(slot, 0),
        other => panic!("expected an acquired frame, got {:?}", other),
    }
    assert_eq!(layer.current_slot(), 1);
}

#[test]
fn test_in_flight_frames_stay_bounded() {
    for frames in 1..=3 {
        let (mut layer, pending) = layer_with(frames, extent(800, 600));
        for i in 0..20 {
            if i == 7 {
                pending.post(FramebufferResized::new(1000, 800));
            }
            run_frame(&mut layer);
        }
        // The GPU never catches up on its own, so every slot reuse had to wait.
        assert_eq!(layer.backend().max_in_flight, frames);
        assert_eq!(layer.backend().submissions().len(), 19);
    }
}

#[test]
fn test_slots_whose_work_finished_are_not_waited_again() {
    let (mut layer, _) = layer_with(3, extent(800, 600));
    run_frame(&mut layer);
    run_frame(&mut layer);

    layer.backend_mut().finish_all();
    let waits_before = layer.backend().count(|e| matches!(e, Event::Wait(_)));
    layer.wait_rendering_idle().unwrap();
    assert_eq!(
        layer.backend().count(|e| matches!(e, Event::Wait(_))),
        waits_before
    );

    // A finished slot can be reused right away.
    assert_eq!(
        run_frame(&mut layer),
        FrameStart::Acquired {
            slot: 2,
            image_index: 2
        }
    );
    assert_eq!(layer.backend().max_in_flight, 2);
}

#[test]
fn test_draws_are_cleared_on_skipped_frames() {
    let (mut layer, pending) = layer_with(2, extent(800, 600));

    pending.post(FramebufferResized::new(0, 0));
    layer.begin_frame().unwrap();
    layer.renderer_mut().draw();
    layer.renderer_mut().draw();
    layer.end_frame().unwrap();

    assert_eq!(layer.renderer().pending_draws, 0);
    assert_eq!(layer.renderer().end_frames, 1);
    assert_eq!(layer.overlay_mut().end_frames, 1);
}

#[test]
fn test_frame_order_is_enforced() {
    let (mut layer, _) = layer_with(2, extent(800, 600));

    assert!(matches!(layer.end_frame(), Err(RhiError::FrameOrder(_))));

    layer.begin_frame().unwrap();
    assert!(layer.is_frame_open());
    assert!(matches!(layer.begin_frame(), Err(RhiError::FrameOrder(_))));
    layer.end_frame().unwrap();
    assert!(!layer.is_frame_open());
}

#[test]
fn test_recording_failure_signals_fence() {
    let (mut layer, _) = layer_with(2, extent(800, 600));

    layer.begin_frame().unwrap();
    layer.renderer_mut().fail_next_record = true;
    assert!(matches!(layer.end_frame(), Err(RhiError::OutOfBounds(_))));

    assert!(layer.backend().events.contains(&Event::Release(0)));
    assert!(layer.backend().submissions().is_empty());
    assert_eq!(layer.renderer().end_frames, 1);
    layer.wait_rendering_idle().unwrap();
    assert!(layer.backend().signaled.iter().all(|&s| s));
}

#[test]
fn test_wait_rendering_idle_only_waits_busy_slots() {
    let (mut layer, _) = layer_with(3, extent(800, 600));
    run_frame(&mut layer);

    let waits_before = layer.backend().count(|e| matches!(e, Event::Wait(_)));
    layer.wait_rendering_idle().unwrap();

    let backend = layer.backend();
    assert_eq!(
        backend.count(|e| matches!(e, Event::Wait(_))),
        waits_before + 1
    );
    assert_eq!(backend.events.last(), Some(&Event::Wait(0)));
    assert!(backend.gpu_queue.is_empty());
}

#[test]
fn test_layer_without_slots_is_rejected() {
    let result = RenderingLayer::new(
        MockBackend::new(0, extent(640, 480), extent(320, 240)),
        MockRecorder::new(SCENE_BUFFER, extent(320, 240)),
        MockRecorder::new(OVERLAY_BUFFER, extent(320, 240)),
        PendingResize::new(),
    );
    assert!(matches!(result, Err(RhiError::FrameOrder(_))));
}

#[test]
fn test_new_layer_hands_targets_to_both_recorders() {
    let (mut layer, _) = layer_with(2, extent(800, 600));

    assert_eq!(layer.renderer().surface.extent, extent(1280, 720));
    assert_eq!(layer.renderer().viewport.extent, extent(800, 600));
    assert_eq!(layer.overlay_mut().viewport.image_count(), 3);
}
