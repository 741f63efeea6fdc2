//! Vulkan instance, window surface and logical device.
//!
//! # Resource Destruction Order
//!
//! Everything created from the device must be gone before the context drops.
//! The context itself then destroys, in field order:
//! 1. the device (waits idle first)
//! 2. the surface
//! 3. the instance

use std::sync::Arc;

use tracing::info;

use pacer_platform::{Surface, Window};
use pacer_rhi::RhiResult;
use pacer_rhi::device::Device;
use pacer_rhi::instance::Instance;
use pacer_rhi::physical_device::select_physical_device;

/// GPU objects that live for the whole run.
pub struct GpuContext {
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl GpuContext {
    /// Creates the instance with the window's surface extensions, the
    /// surface, and a device on the best GPU that can present to it.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails or no GPU qualifies.
    pub fn new(window: &Window, application_name: &str, enable_validation: bool) -> RhiResult<Self> {
        let instance = Instance::new(
            application_name,
            enable_validation,
            window.required_extensions()?,
        )?;

        let surface = window.create_surface(&instance)?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        info!("GPU context ready");

        Ok(Self {
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}
