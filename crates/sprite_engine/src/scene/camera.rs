//! 2D camera
//!
//! The camera offsets the world for drawing and defines the viewport used for
//! culling. Zoom and rotation are passed through to the shaders untouched.

use crate::foundation::math::{Rect, Vec2};

/// World-space view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Top-left corner of the view in world space
    pub position: Vec2,
    /// Zoom factor
    pub zoom: f32,
    /// Rotation in degrees
    pub rotation: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            zoom: 1.0,
            rotation: 0.0,
        }
    }
}

impl Camera {
    /// Camera at the world origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the camera to `(x, y)`
    pub fn look_at(&mut self, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
    }

    /// Move the camera by `(dx, dy)`
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.position += Vec2::new(dx, dy);
    }

    /// Visible world rectangle for a `width` x `height` presentation surface
    pub fn viewport(&self, width: u32, height: u32) -> Rect {
        Rect::new(self.position.x, self.position.y, width as f32, height as f32)
    }

    /// Packed (x, y, zoom, rotation) shader value
    pub fn uniform(&self) -> [f32; 4] {
        [self.position.x, self.position.y, self.zoom, self.rotation]
    }
}
