//! Scene objects
//!
//! Sprites, the shadow records that track what was last written for them, and
//! the camera that defines the visible viewport.

pub mod camera;
pub mod shadow;
pub mod sprite;

pub use camera::Camera;
pub use shadow::{SceneEntry, ShadowRecord, TextureTarget};
pub use sprite::{SourceRect, Sprite};

slotmap::new_key_type! {
    /// Stable identifier of a sprite
    pub struct ObjectId;
}
