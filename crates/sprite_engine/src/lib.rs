//! # Sprite Engine
//!
//! A layered 2D sprite renderer built around a retained scene.
//!
//! ## Features
//!
//! - **Diffing synchronization**: only the attribute groups a sprite actually
//!   changed are rewritten, and only dirty ranges reach the device
//! - **Layer caching**: every layer renders into its own surface, redrawn only
//!   when something on it changed; static layers skip the recompute pass
//! - **Texture atlas**: images are packed into multi-page atlases on the fly
//! - **Custom render passes**: per-layer fragment snippets spliced into the
//!   compositing program
//! - **Backend agnostic**: everything goes through [`render::GraphicsDevice`];
//!   [`render::RecordingDevice`] runs the whole pipeline headless
//!
//! ## Quick Start
//!
//! ```rust
//! use sprite_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     sprite_engine::foundation::logging::init_with_level("warn");
//!
//!     let config = EngineConfig::default().with_size(320, 240);
//!     let mut engine = SpriteEngine::new(config, RecordingDevice::default())?;
//!
//!     engine.add_layer(0, LayerOptions::static_layer());
//!     let ship = engine.add_object(Sprite::new().at(10.0, 10.0).with_color(0x3366FF).on_layer(1.0));
//!
//!     let report = engine.tick()?;
//!     assert!(report.presented());
//!
//!     engine.object_mut(ship)?.rotation = 90.0;
//!     engine.update_object(ship)?;
//!     engine.tick()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::cast_possible_truncation)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;

pub mod assets;
pub mod render;
pub mod scene;
pub mod scheduler;

mod application;
mod engine;

#[cfg(test)]
mod engine_tests;

pub use application::{AppError, AppEvent, Application, Runner};
pub use engine::{EngineError, EngineResult, SpriteEngine};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        AppError, AppEvent, Application, Runner,
        EngineError, EngineResult, SpriteEngine,
        assets::{DeferredImageLoader, ImageData, ImageId, ImageLoader, ImageState, ThreadedImageLoader},
        core::{Config, EngineConfig},
        foundation::math::{Rect, Vec2},
        render::{
            GraphicsDevice, LayerId, LayerOptions, LayerSpec, PassTarget, RecordingDevice,
            RenderPassOptions,
        },
        scene::{Camera, ObjectId, SourceRect, Sprite},
        scheduler::{PlaybackControls, SchedulerState, TickReport},
    };
}
