//! Window management using winit.
//!
//! This module provides window creation, Vulkan surface creation and resize
//! forwarding into a [`PendingResize`] mailbox.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use pacer_rhi::instance::Instance;
use pacer_rhi::{RhiError, RhiResult};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use crate::resize::{FramebufferResized, PendingResize};

/// RAII wrapper for a Vulkan surface.
///
/// The surface is destroyed when dropped. The Vulkan instance must outlive it,
/// and so must nothing created from it (the swapchain in particular).
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get a reference to the surface loader.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface from the
        // same instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A winit window plus the resize mailbox the frame loop reads.
pub struct Window {
    window: Arc<WinitWindow>,
    pending_resize: PendingResize,
}

impl Window {
    /// Create a new resizable window with the given inner size and title.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceError`] if the window cannot be created.
    pub fn new(
        event_loop: &ActiveEventLoop,
        width: u32,
        height: u32,
        title: &str,
    ) -> RhiResult<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| RhiError::SurfaceError(format!("failed to create window: {}", e)))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
            pending_resize: PendingResize::new(),
        })
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current framebuffer size in physical pixels, queried on demand.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Handle on the resize mailbox; clones share the same slot.
    pub fn pending_resize(&self) -> PendingResize {
        self.pending_resize.clone()
    }

    /// Forwards a framebuffer resize to the mailbox.
    ///
    /// Call this from the `WindowEvent::Resized` handler. Zero sizes are
    /// forwarded as well; the frame loop keeps them pending until the window
    /// is restored.
    pub fn notify_resized(&self, width: u32, height: u32) {
        tracing::debug!("Framebuffer resized: {}x{}", width, height);
        self.pending_resize
            .post(FramebufferResized::new(width, height));
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    ///
    /// # Errors
    ///
    /// Returns an error if the display handle is unavailable or the platform
    /// is not supported.
    pub fn required_extensions(&self) -> RhiResult<&'static [*const c_char]> {
        let display_handle = self.window.display_handle().map_err(|e| {
            RhiError::SurfaceError(format!("failed to get display handle: {}", e))
        })?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())?;

        tracing::debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns pointers to static, NUL-terminated
                // extension names.
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions)
    }

    /// Create a Vulkan surface for this window.
    ///
    /// `instance` must have been created with [`Window::required_extensions`]
    /// and must outlive the returned [`Surface`].
    ///
    /// # Errors
    ///
    /// Returns an error if the window handles are unavailable or surface
    /// creation fails.
    pub fn create_surface(&self, instance: &Instance) -> RhiResult<Surface> {
        let display_handle = self.window.display_handle().map_err(|e| {
            RhiError::SurfaceError(format!("failed to get display handle: {}", e))
        })?;

        let window_handle = self.window.window_handle().map_err(|e| {
            RhiError::SurfaceError(format!("failed to get window handle: {}", e))
        })?;

        // SAFETY: The entry and instance are valid for the lifetime of `instance`.
        // The display and window handles come from the live winit window.
        // The surface is destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )?
        };

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}
