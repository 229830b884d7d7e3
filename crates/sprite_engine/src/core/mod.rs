//! # Core Engine Module
//!
//! Shared configuration types used by every subsystem of the sprite engine.
//!
//! ## Organization
//!
//! - **Config**: Typed configuration for pacing, atlas, vertex store and assets
//! - **Foundation**: Low-level utilities (math, collections, time, logging)

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    EngineConfig,
    AtlasConfig,
    VertexConfig,
    AssetConfig,
    Config,
    ConfigError,
};
