//! pacer - windowed host for the interactive frame pipeline.
//!
//! Draws an animated triangle and rectangle into the offscreen viewport and
//! lets the overlay composite it onto the window.

use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use pacer_core::Config;
use pacer_platform::Window;
use pacer_renderer::overlay::scaled_extent;
use pacer_renderer::{
    BlitOverlay, CameraInfo, FrameBackend, FrameManager, FrameStart, GpuContext, Renderer,
    RendererSettings, RenderingLayer, VulkanRenderingLayer,
};

/// GPU state created once the event loop resumes.
///
/// Fields drop in declaration order: the layer waits for in-flight work and
/// releases its resources before the context tears down the device.
struct Graphics {
    layer: VulkanRenderingLayer,
    context: GpuContext,
    window: Window,
}

impl Graphics {
    fn new(event_loop: &ActiveEventLoop, config: &Config) -> Result<Self> {
        let window = Window::new(
            event_loop,
            config.window.width,
            config.window.height,
            &config.window.title,
        )
        .context("failed to create window")?;

        let renderer_config = &config.renderer;
        let context = GpuContext::new(&window, &config.window.title, renderer_config.validation)
            .context("failed to create GPU context")?;

        let (width, height) = window.framebuffer_size();
        let framebuffer = ash::vk::Extent2D { width, height };
        let viewport = scaled_extent(framebuffer, renderer_config.viewport_scale);

        let frame_manager = FrameManager::new(
            &context,
            renderer_config.frames_in_flight,
            framebuffer,
            viewport,
        )
        .context("failed to create frame manager")?;

        let settings = RendererSettings {
            frames_in_flight: renderer_config.frames_in_flight,
            vertex_shader: renderer_config.vertex_shader.clone(),
            fragment_shader: renderer_config.fragment_shader.clone(),
            clear_color: renderer_config.clear_color,
            geometry_budget: renderer_config.geometry_budget,
        };
        let renderer = Renderer::new(
            context.device().clone(),
            &settings,
            frame_manager.viewport_target().format,
        )
        .context("failed to create renderer")?;

        let overlay = BlitOverlay::new(
            context.device().clone(),
            renderer_config.frames_in_flight,
            renderer_config.viewport_scale,
            renderer_config.clear_color,
        )
        .context("failed to create overlay")?;

        let layer = RenderingLayer::new(frame_manager, renderer, overlay, window.pending_resize())
            .context("failed to create rendering layer")?;

        Ok(Self {
            layer,
            context,
            window,
        })
    }

    fn draw(&mut self, elapsed: f32) -> Result<()> {
        let start = self.layer.render_frame(|renderer| {
            renderer.set_camera(CameraInfo::default());

            let spin = Mat4::from_rotation_z(elapsed);
            renderer.draw_triangle(
                Mat4::from_translation(Vec3::new(-1.2, 0.0, 0.0)) * spin,
                Vec4::new(0.9, 0.3, 0.2, 1.0),
            );
            renderer.draw_rect(
                Mat4::from_translation(Vec3::new(1.2, elapsed.sin() * 0.5, 0.0))
                    * Mat4::from_scale(Vec3::splat(0.6)),
                Vec4::new(0.2, 0.6, 0.9, 1.0),
            );
        })?;

        if let FrameStart::Skipped(reason) = start {
            debug!("Frame skipped: {:?}", reason);
        }
        Ok(())
    }
}

struct App {
    config: Config,
    graphics: Option<Graphics>,
    started: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            graphics: None,
            started: Instant::now(),
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut graphics) = self.graphics.take() {
            if let Err(e) = graphics.layer.wait_rendering_idle() {
                error!("Failed to wait for rendering to finish: {:?}", e);
            }
            if let Err(e) = graphics.context.device().wait_idle() {
                error!("Failed to wait for device idle: {:?}", e);
            }
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }

        match Graphics::new(event_loop, &self.config) {
            Ok(graphics) => {
                info!("Initialization complete, entering main loop");
                graphics.window.request_redraw();
                self.graphics = Some(graphics);
            }
            Err(e) => {
                error!("Failed to initialize: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref graphics) = self.graphics {
                    graphics.window.notify_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let elapsed = self.started.elapsed().as_secs_f32();
                if let Some(ref mut graphics) = self.graphics
                    && let Err(e) = graphics.draw(elapsed)
                {
                    error!("Render error: {:?}", e);
                    self.shutdown(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref graphics) = self.graphics {
            graphics.window.request_redraw();
        }
    }

    fn exiting(&mut self, event_loop: &ActiveEventLoop) {
        self.shutdown(event_loop);
    }
}

fn main() -> Result<()> {
    pacer_core::init_logging();
    info!("Starting pacer");

    let config = Config::load_or_default(Config::FILE_NAME)?;
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
