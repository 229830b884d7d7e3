//! Sprite descriptions
//!
//! A [`Sprite`] is the caller-owned, live description of one textured or
//! color-filled rectangle. The engine diffs it against what was last written to
//! the vertex store, so fields can be changed freely between ticks.

use serde::{Deserialize, Serialize};

use crate::foundation::math::Rect;

/// Optional sub-rectangle of an image, in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceRect {
    /// Left offset inside the image
    pub sx: f32,
    /// Top offset inside the image
    pub sy: f32,
    /// Width to sample; zero means the full image width
    pub sw: f32,
    /// Height to sample; zero means the full image height
    pub sh: f32,
}

impl SourceRect {
    /// Create a source rectangle
    pub const fn new(sx: f32, sy: f32, sw: f32, sh: f32) -> Self {
        Self { sx, sy, sw, sh }
    }
}

/// One drawable rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sprite {
    /// Layer the sprite is drawn on
    pub layer: f32,
    /// Left edge in world space
    pub x: f32,
    /// Top edge in world space
    pub y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
    /// Rotation in degrees around the center
    pub rotation: f32,
    /// Opacity in `0.0..=1.0`
    pub opacity: f32,
    /// Packed `0xRRGGBB` fill color; zero means fully transparent
    pub color: u32,
    /// Image source key; `None` draws a flat color fill
    pub image: Option<String>,
    /// Sub-rectangle of the image to sample
    pub source: Option<SourceRect>,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            layer: 0.0,
            x: 0.0,
            y: 0.0,
            width: 32.0,
            height: 32.0,
            rotation: 0.0,
            opacity: 1.0,
            color: 0,
            image: None,
            source: None,
        }
    }
}

impl Sprite {
    /// Default 32x32 sprite at the origin of layer 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the position
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Set the size
    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the fill color
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Set the layer
    pub fn on_layer(mut self, layer: f32) -> Self {
        self.layer = layer;
        self
    }

    /// Set the rotation in degrees
    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    /// Set the opacity
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Draw an image instead of a flat fill
    pub fn with_image(mut self, key: impl Into<String>) -> Self {
        self.image = Some(key.into());
        self
    }

    /// Sample only part of the image
    pub fn with_source(mut self, source: SourceRect) -> Self {
        self.source = Some(source);
        self
    }

    /// World-space bounds
    pub const fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Normalized RGBA; alpha is 1 for any non-zero color and 0 otherwise
    pub fn rgba(&self) -> [f32; 4] {
        let [_, r, g, b] = self.color.to_be_bytes();
        let alpha = if self.color == 0 { 0.0 } else { 1.0 };
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            alpha,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let sprite = Sprite::new();
        assert_eq!((sprite.width, sprite.height), (32.0, 32.0));
        assert_eq!(sprite.opacity, 1.0);
        assert_eq!(sprite.layer, 0.0);
        assert_eq!(sprite.color, 0);
        assert!(sprite.image.is_none());
    }

    #[test]
    fn test_rgba_unpacking() {
        assert_eq!(Sprite::new().with_color(0xFF0000).rgba(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(Sprite::new().rgba(), [0.0, 0.0, 0.0, 0.0]);
        let rgba = Sprite::new().with_color(0x00_80_FF).rgba();
        assert!((rgba[1] - 128.0 / 255.0).abs() < f32::EPSILON);
        assert_eq!(rgba[2], 1.0);
    }

    #[test]
    fn test_deserialize_partial_sprite() {
        let sprite: Sprite = ron::from_str("(x: 10.0, color: 255, image: Some(\"a.png\"))").unwrap();
        assert_eq!(sprite.x, 10.0);
        assert_eq!(sprite.width, 32.0);
        assert_eq!(sprite.image.as_deref(), Some("a.png"));
    }
}
