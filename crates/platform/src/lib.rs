//! Platform layer for the pacer frame pipeline.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation for that window
//! - A single-slot resize mailbox read by the frame loop

mod resize;
mod window;

pub use resize::{FramebufferResized, PendingResize};
pub use window::{Surface, Window};

// Re-export winit types the host loop needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
