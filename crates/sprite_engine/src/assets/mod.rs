//! Image assets
//!
//! Decoding, loading and the deduplicating cache that feeds the texture atlas.

pub mod image_cache;
pub mod image_loader;
pub mod loader;

pub use image_cache::{ImageAsset, ImageCache, ImageId, ImageState};
pub use image_loader::ImageData;
pub use loader::{DeferredImageLoader, ImageLoader, LoadedImage, ThreadedImageLoader};

use thiserror::Error;

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Asset loading errors
#[derive(Debug, Error)]
pub enum AssetError {
    /// No image registered under the key
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Reading or decoding failed
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Pixel data is malformed
    #[error("Invalid asset data: {0}")]
    InvalidData(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
