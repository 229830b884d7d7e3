//! # Engine Configuration
//!
//! Explicit, typed configuration for the sprite engine. Every field has a
//! documented default, so a settings file only needs the values it changes.
//!
//! ## Configuration Categories
//!
//! - **Pacing**: tick rate, draw-call cap, pause behaviour
//! - **Atlas Config**: page geometry and scan granularity
//! - **Vertex Config**: growth chunk of the per-layer attribute arrays
//! - **Asset Config**: image base path and processing throttle

use serde::{Serialize, Deserialize};
use std::time::Duration;

pub use crate::config::{Config, ConfigError};

/// # Atlas Configuration
///
/// Geometry of the texture-atlas pages images are packed into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Width and height of every atlas page in pixels
    pub page_size: u32,
    /// Grid step used when scanning for a free origin
    pub step: u32,
    /// Maximum number of pages; `None` uses the device's texture-unit count
    pub max_pages: Option<u32>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            step: 256,
            max_pages: None,
        }
    }
}

/// # Vertex Configuration
///
/// Growth policy of the per-layer attribute arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexConfig {
    /// Number of quad slots added each time a layer runs out of free slots
    pub chunk_slots: usize,
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self { chunk_slots: 100 }
    }
}

/// # Asset Configuration
///
/// Image loading and processing throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base directory prepended to relative image sources
    pub base_path: String,
    /// Maximum number of completed images placed into the atlas per processing pass
    pub process_limit: usize,
    /// Minimum milliseconds between two processing passes
    pub process_interval_ms: u64,
    /// Worker threads decoding images from disk
    pub loader_threads: usize,
}

impl AssetConfig {
    /// Minimum interval between processing passes
    pub const fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms)
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            process_limit: 2,
            process_interval_ms: 150,
            loader_threads: 4,
        }
    }
}

/// # Engine Configuration
///
/// Top-level configuration recognized at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick rate while running, in hertz
    pub target_refresh_hz: f32,
    /// Ceiling on presented frames per second; also the idle tick rate
    pub fps_cap: f32,
    /// Treat a non-empty image queue like a pause
    pub pause_on_queue: bool,
    /// Whether the engine starts playing
    pub playing: bool,
    /// Initial presentation width in pixels
    pub width: u32,
    /// Initial presentation height in pixels
    pub height: u32,
    /// Default log filter used by [`crate::foundation::logging::init_with_level`]
    pub log_level: String,
    /// Atlas page settings
    pub atlas: AtlasConfig,
    /// Vertex store settings
    pub vertex: VertexConfig,
    /// Image loading settings
    pub assets: AssetConfig,
}

impl EngineConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            target_refresh_hz: 60.0,
            fps_cap: 60.0,
            pause_on_queue: true,
            playing: true,
            width: 800,
            height: 600,
            log_level: "info".to_string(),
            atlas: AtlasConfig::default(),
            vertex: VertexConfig::default(),
            assets: AssetConfig::default(),
        }
    }

    /// Set the presentation size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the tick rate used while running
    pub fn with_target_refresh_hz(mut self, hz: f32) -> Self {
        self.target_refresh_hz = hz;
        self
    }

    /// Set the draw-call ceiling
    pub fn with_fps_cap(mut self, fps: f32) -> Self {
        self.fps_cap = fps;
        self
    }

    /// Enable or disable pausing while images are pending
    pub fn with_pause_on_queue(mut self, enabled: bool) -> Self {
        self.pause_on_queue = enabled;
        self
    }

    /// Set the initial play state
    pub fn with_playing(mut self, playing: bool) -> Self {
        self.playing = playing;
        self
    }

    /// Set custom atlas configuration
    pub fn with_atlas(mut self, atlas: AtlasConfig) -> Self {
        self.atlas = atlas;
        self
    }

    /// Set the vertex growth chunk in quads
    pub fn with_chunk_slots(mut self, slots: usize) -> Self {
        self.vertex.chunk_slots = slots;
        self
    }

    /// Set custom asset configuration
    pub fn with_assets(mut self, assets: AssetConfig) -> Self {
        self.assets = assets;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_refresh_hz.is_finite() && self.target_refresh_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "target_refresh_hz must be positive, got {}",
                self.target_refresh_hz
            )));
        }
        if !(self.fps_cap.is_finite() && self.fps_cap > 0.0) {
            return Err(ConfigError::Invalid(format!("fps_cap must be positive, got {}", self.fps_cap)));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid("presentation size cannot be zero".to_string()));
        }
        if self.atlas.page_size == 0 || self.atlas.step == 0 {
            return Err(ConfigError::Invalid("atlas page size and step must be non-zero".to_string()));
        }
        if self.atlas.max_pages == Some(0) {
            return Err(ConfigError::Invalid("atlas needs at least one page".to_string()));
        }
        if self.assets.loader_threads == 0 {
            return Err(ConfigError::Invalid("image loader needs at least one worker".to_string()));
        }
        if self.vertex.chunk_slots == 0 {
            return Err(ConfigError::Invalid("vertex chunk must hold at least one quad".to_string()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}
