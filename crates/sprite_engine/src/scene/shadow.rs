//! Shadow records
//!
//! What the synchronizer last wrote for a sprite, grouped the way the attribute
//! writes are grouped. A group is rewritten only when its values differ from
//! the record, or when the record is forced.

use crate::render::layer::LayerId;
use crate::scene::Sprite;

/// Texture coordinate written for a sprite
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureTarget {
    /// No image: flat color fill
    Fill,
    /// Atlas pixel rectangle (x, y, width, height)
    Region([f32; 4]),
}

impl TextureTarget {
    /// Per-vertex value written to the texture coordinate attribute
    pub const fn vertex_value(self) -> [f32; 4] {
        match self {
            Self::Fill => [-1.0; 4],
            Self::Region(rect) => rect,
        }
    }
}

/// Last values written to the vertex store for one sprite
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowRecord {
    /// Layer the slot belongs to
    pub layer: LayerId,
    /// Slot inside the layer's vertex store
    pub slot: usize,
    /// Rewrite every group on the next synchronization
    pub force: bool,
    /// Whether the sprite is currently hidden by viewport culling
    pub culled: bool,
    /// Whether the sprite is waiting in the update queue
    pub queued: bool,
    /// Position and size
    pub geometry: [f32; 4],
    /// Rotation, opacity, atlas page
    pub motion: [f32; 3],
    /// Texture coordinate target
    pub texture: TextureTarget,
    /// Packed fill color
    pub color: u32,
}

impl ShadowRecord {
    /// Fresh record for a newly allocated slot
    pub const fn new(layer: LayerId, slot: usize) -> Self {
        Self {
            layer,
            slot,
            force: true,
            culled: false,
            queued: false,
            geometry: [0.0; 4],
            motion: [0.0; 3],
            texture: TextureTarget::Fill,
            color: 0,
        }
    }

    /// Point the record at a new slot, forcing a full rewrite
    pub fn reattach(&mut self, layer: LayerId, slot: usize) {
        self.layer = layer;
        self.slot = slot;
        self.force = true;
        self.culled = false;
        self.texture = TextureTarget::Fill;
    }
}

/// A live sprite together with its shadow record
#[derive(Debug, Clone)]
pub struct SceneEntry {
    /// Caller-visible description
    pub sprite: Sprite,
    /// Synchronizer bookkeeping
    pub shadow: ShadowRecord,
}
