//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe wrappers over `ash` for the pieces the frame pipeline needs:
//! - Instance, physical device selection and logical device
//! - Swapchain with typed acquire and present outcomes
//! - Command pools and command buffer recording
//! - Host-visible buffers, dynamic uniform buffers and the geometry ring arena
//! - Offscreen color images, descriptors, shaders and graphics pipelines
//! - Fences, semaphores and per-slot frame synchronization

mod error;

pub mod arena;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod uniform;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
