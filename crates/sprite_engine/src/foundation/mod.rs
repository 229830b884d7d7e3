//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types (2D vectors, rectangles)
//! - Collections (free-index lists)
//! - Time management (draw throttling, FPS counting)
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod time;
pub mod logging;
