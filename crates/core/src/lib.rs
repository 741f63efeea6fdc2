//! Core utilities shared across the pacer workspace.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration loading

mod config;
mod error;
mod logging;

pub use config::{Config, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
