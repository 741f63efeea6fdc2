//! Application configuration loaded from `pacer.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! [window]
//! title = "pacer"
//! width = 1280
//! height = 720
//!
//! [renderer]
//! validation = true
//! frames_in_flight = 2
//! vertex_shader = "shaders/spirv/scene.vert.spv"
//! fragment_shader = "shaders/spirv/scene.frag.spv"
//! clear_color = [0.1, 0.1, 0.12, 1.0]
//! geometry_budget = 65536
//! viewport_scale = 0.75
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Highest supported number of frames in flight.
const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window settings.
    pub window: WindowConfig,
    /// Frame pipeline settings.
    pub renderer: RendererConfig,
}

/// `[window]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title.
    pub title: String,
    /// Initial inner width in physical pixels.
    pub width: u32,
    /// Initial inner height in physical pixels.
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "pacer".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// `[renderer]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
    /// Number of frame-in-flight slots.
    pub frames_in_flight: usize,
    /// Precompiled SPIR-V vertex shader.
    pub vertex_shader: PathBuf,
    /// Precompiled SPIR-V fragment shader.
    pub fragment_shader: PathBuf,
    /// Clear color of the viewport, linear RGBA.
    pub clear_color: [f32; 4],
    /// Initial geometry arena bytes per frame-in-flight slot.
    pub geometry_budget: u64,
    /// Fraction of the window the viewport panel covers on each axis.
    pub viewport_scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            vertex_shader: PathBuf::from("shaders/spirv/scene.vert.spv"),
            fragment_shader: PathBuf::from("shaders/spirv/scene.frag.spv"),
            clear_color: [0.1, 0.1, 0.12, 1.0],
            geometry_budget: 64 * 1024,
            viewport_scale: 0.75,
        }
    }
}

impl Config {
    /// Default file name, looked up in the working directory.
    pub const FILE_NAME: &'static str = "pacer.toml";

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed TOML and [`Error::Config`]
    /// for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Loads `path` when it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Writes the configuration as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        let renderer = &self.renderer;
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&renderer.frames_in_flight) {
            return Err(Error::Config(format!(
                "renderer.frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, renderer.frames_in_flight
            )));
        }

        if renderer.geometry_budget == 0 {
            return Err(Error::Config(
                "renderer.geometry_budget must be non-zero".to_string(),
            ));
        }

        if !(renderer.viewport_scale > 0.0 && renderer.viewport_scale <= 1.0) {
            return Err(Error::Config(format!(
                "renderer.viewport_scale must be in (0, 1], got {}",
                renderer.viewport_scale
            )));
        }

        if renderer
            .clear_color
            .iter()
            .any(|c| !(0.0..=1.0).contains(c))
        {
            return Err(Error::Config(format!(
                "renderer.clear_color components must be in [0, 1], got {:?}",
                renderer.clear_color
            )));
        }

        Ok(())
    }
}
