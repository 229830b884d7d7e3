//! # Layers
//!
//! A layer is an ordered drawing plane. Each one owns a vertex store with one
//! slot per sprite and an offscreen surface (its *layer cache*) that is only
//! re-rendered when something on the layer changed. Layers composite in
//! ascending id order; ids are floats so a layer can be slotted between two
//! existing ones.
//!
//! ## Flags
//!
//! - `NEEDS_RECOMPUTE`: sprites on the layer must be re-synchronized even if
//!   the layer is static
//! - `NEEDS_REDRAW`: the cached surface is stale
//!
//! A static layer skips the per-tick recompute pass unless flagged, which makes
//! large unchanging backgrounds free after their first draw.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::foundation::math::Rect;
use crate::render::device::{
    BufferHandle, DeviceResult, FramebufferHandle, GraphicsDevice, TextureHandle,
};
use crate::render::vertex_store::{Attribute, VertexResult, VertexStore, COMPONENTS};
use crate::scene::ObjectId;

/// Layer identifier, ordered by value
///
/// Negative zero is folded into zero so both name the same layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerId(f32);

impl LayerId {
    /// Wrap a layer value
    pub fn new(value: f32) -> Self {
        Self(if value == 0.0 { 0.0 } else { value })
    }

    /// Raw value
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl PartialEq for LayerId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LayerId {}

impl PartialOrd for LayerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LayerId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for LayerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<f32> for LayerId {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<i32> for LayerId {
    fn from(value: i32) -> Self {
        Self::new(value as f32)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Pending work for a layer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerFlags: u8 {
        /// Re-synchronize every sprite on the layer
        const NEEDS_RECOMPUTE = 1 << 0;
        /// Re-render the cached surface
        const NEEDS_REDRAW = 1 << 1;
    }
}

/// Options for `SpriteEngine::add_layer`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerOptions {
    /// Set the static flag; `None` leaves it unchanged
    pub is_static: Option<bool>,
}

impl LayerOptions {
    /// Options marking the layer static
    pub const fn static_layer() -> Self {
        Self { is_static: Some(true) }
    }

    /// Options marking the layer dynamic
    pub const fn dynamic_layer() -> Self {
        Self { is_static: Some(false) }
    }
}

/// Read-only summary of a layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSpec {
    /// Layer id
    pub id: LayerId,
    /// Whether the recompute pass skips the layer unless flagged
    pub is_static: bool,
    /// Sprites on the layer
    pub object_count: usize,
    /// Slots backed by the vertex store
    pub capacity: usize,
    /// Right-most sprite edge seen
    pub width: f32,
    /// Bottom-most sprite edge seen
    pub height: f32,
    /// Pending work
    pub flags: LayerFlags,
}

/// Offscreen surface caching a layer's rendered sprites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSurface {
    /// Render target
    pub framebuffer: FramebufferHandle,
    /// Color attachment sampled during compositing
    pub texture: TextureHandle,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
struct LayerBuffers {
    handles: [BufferHandle; 5],
    capacity: usize,
}

/// One drawing plane
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    objects: BTreeSet<ObjectId>,
    store: VertexStore,
    flags: LayerFlags,
    is_static: bool,
    bounds: (f32, f32),
    surface: Option<LayerSurface>,
    buffers: Option<LayerBuffers>,
}

impl Layer {
    /// Create an empty dynamic layer
    pub fn new(id: LayerId, chunk_slots: usize) -> Self {
        Self {
            id,
            objects: BTreeSet::new(),
            store: VertexStore::new(chunk_slots),
            flags: LayerFlags::NEEDS_RECOMPUTE | LayerFlags::NEEDS_REDRAW,
            is_static: false,
            bounds: (0.0, 0.0),
            surface: None,
            buffers: None,
        }
    }

    /// Layer id
    pub const fn id(&self) -> LayerId {
        self.id
    }

    /// Whether the recompute pass skips the layer unless flagged
    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    /// Change the static flag
    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
    }

    /// Pending work
    pub const fn flags(&self) -> LayerFlags {
        self.flags
    }

    /// Add pending work
    pub fn mark(&mut self, flags: LayerFlags) {
        self.flags |= flags;
    }

    /// Clear pending work
    pub fn unmark(&mut self, flags: LayerFlags) {
        self.flags &= !flags;
    }

    /// Whether the cached surface is stale
    pub const fn needs_redraw(&self) -> bool {
        self.flags.contains(LayerFlags::NEEDS_REDRAW)
    }

    /// Whether the next recompute pass visits this layer
    pub const fn wants_recompute(&self) -> bool {
        !self.is_static || self.flags.contains(LayerFlags::NEEDS_RECOMPUTE)
    }

    /// Sprites on this layer
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.iter().copied()
    }

    /// Number of sprites on this layer
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Whether the layer holds no sprites
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Give `object` a slot on this layer
    pub fn attach(&mut self, object: ObjectId) -> usize {
        self.objects.insert(object);
        self.mark(LayerFlags::NEEDS_REDRAW);
        self.store.allocate()
    }

    /// Remove `object` and release its slot
    pub fn detach(&mut self, object: ObjectId, slot: usize) -> VertexResult<()> {
        self.objects.remove(&object);
        self.mark(LayerFlags::NEEDS_REDRAW);
        self.store.release(slot)
    }

    /// Attribute arrays
    pub const fn store(&self) -> &VertexStore {
        &self.store
    }

    /// Mutable attribute arrays
    pub fn store_mut(&mut self) -> &mut VertexStore {
        &mut self.store
    }

    /// Extent covered by sprites: right-most and bottom-most edges
    pub const fn bounds(&self) -> (f32, f32) {
        self.bounds
    }

    /// Extend the bounds to cover `rect`
    pub fn grow_bounds(&mut self, rect: Rect) {
        self.bounds.0 = self.bounds.0.max(rect.right());
        self.bounds.1 = self.bounds.1.max(rect.bottom());
    }

    /// Forget the bounds before a full recompute
    pub fn reset_bounds(&mut self) {
        self.bounds = (0.0, 0.0);
    }

    /// Whether there is anything to render: sprites with a non-zero extent
    pub fn is_drawable(&self) -> bool {
        !self.is_empty() && self.bounds.0 > 0.0 && self.bounds.1 > 0.0
    }

    /// Cached surface, if created
    pub const fn surface(&self) -> Option<LayerSurface> {
        self.surface
    }

    /// Make sure the cached surface exists at the given size
    ///
    /// A newly created surface marks the layer for redraw.
    pub fn ensure_surface<D: GraphicsDevice>(&mut self, device: &mut D, width: u32, height: u32) -> DeviceResult<LayerSurface> {
        if let Some(surface) = self.surface {
            if surface.width == width && surface.height == height {
                return Ok(surface);
            }
            device.delete_framebuffer(surface.framebuffer);
        }

        let framebuffer = device.create_framebuffer(width, height)?;
        let texture = device.framebuffer_texture(framebuffer)?;
        let surface = LayerSurface {
            framebuffer,
            texture,
            width,
            height,
        };
        self.surface = Some(surface);
        self.mark(LayerFlags::NEEDS_REDRAW);
        log::debug!("Layer {} surface created at {}x{}", self.id, width, height);
        Ok(surface)
    }

    /// Push pending vertex changes to the device
    ///
    /// Recreates the buffers after growth, otherwise writes only the dirty
    /// ranges. Returns the number of bytes written.
    pub fn upload_vertices<D: GraphicsDevice>(&mut self, device: &mut D) -> DeviceResult<usize> {
        let capacity = self.store.capacity();
        let extended = self.store.take_extend();
        let stale = self.buffers.map_or(true, |b| b.capacity != capacity);

        if extended || stale {
            if let Some(old) = self.buffers.take() {
                for handle in old.handles {
                    device.delete_vertex_buffer(handle);
                }
            }
            self.store.clear_dirty();
            if capacity == 0 {
                return Ok(0);
            }

            let mut handles = [BufferHandle(0); 5];
            let mut written = 0;
            for attribute in Attribute::ALL {
                let bytes: &[u8] = bytemuck::cast_slice(self.store.attribute(attribute));
                let handle = device.create_vertex_buffer(bytes.len())?;
                device.write_vertex_buffer(handle, 0, bytes)?;
                handles[attribute.index()] = handle;
                written += bytes.len();
            }
            self.buffers = Some(LayerBuffers { handles, capacity });
            log::debug!("Layer {} vertex buffers rebuilt for {} slots", self.id, capacity);
            return Ok(written);
        }

        let Some(buffers) = self.buffers else {
            return Ok(0);
        };
        let mut written = 0;
        for attribute in Attribute::ALL {
            if let Some(range) = self.store.take_dirty(attribute) {
                let offset = range.start * std::mem::size_of::<f32>();
                let bytes: &[u8] = bytemuck::cast_slice(&self.store.attribute(attribute)[range]);
                device.write_vertex_buffer(buffers.handles[attribute.index()], offset, bytes)?;
                written += bytes.len();
            }
        }
        Ok(written)
    }

    /// Bind the layer's vertex buffers to their attributes
    ///
    /// Returns the vertex count to draw, zero if there is nothing uploaded.
    pub fn bind_vertices<D: GraphicsDevice>(&self, device: &mut D) -> DeviceResult<u32> {
        let Some(buffers) = self.buffers else {
            return Ok(0);
        };
        for attribute in Attribute::ALL {
            device.bind_attribute(attribute.name(), buffers.handles[attribute.index()], COMPONENTS as u32)?;
        }
        Ok(u32::try_from(self.store.vertex_count()).unwrap_or(u32::MAX))
    }

    /// Free every device resource held by the layer
    pub fn release_device_resources<D: GraphicsDevice>(&mut self, device: &mut D) {
        if let Some(surface) = self.surface.take() {
            device.delete_framebuffer(surface.framebuffer);
        }
        if let Some(buffers) = self.buffers.take() {
            for handle in buffers.handles {
                device.delete_vertex_buffer(handle);
            }
        }
    }

    /// Read-only summary
    pub fn spec(&self) -> LayerSpec {
        LayerSpec {
            id: self.id,
            is_static: self.is_static,
            object_count: self.objects.len(),
            capacity: self.store.capacity(),
            width: self.bounds.0,
            height: self.bounds.1,
            flags: self.flags,
        }
    }
}

/// All layers, kept in ascending id order
#[derive(Debug)]
pub struct LayerStack {
    layers: BTreeMap<LayerId, Layer>,
    chunk_slots: usize,
}

impl LayerStack {
    /// Create an empty stack whose layers grow by `chunk_slots`
    pub const fn new(chunk_slots: usize) -> Self {
        Self {
            layers: BTreeMap::new(),
            chunk_slots,
        }
    }

    /// Borrow a layer
    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Mutably borrow a layer
    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(&id)
    }

    /// Borrow a layer, creating it if needed
    pub fn get_or_create(&mut self, id: LayerId) -> &mut Layer {
        let chunk_slots = self.chunk_slots;
        self.layers.entry(id).or_insert_with(|| {
            log::debug!("Created layer {}", id);
            Layer::new(id, chunk_slots)
        })
    }

    /// Whether a layer exists
    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    /// Layer ids in compositing order
    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.keys().copied().collect()
    }

    /// Layers in compositing order
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    /// Mutable layers in compositing order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers.values_mut()
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Flag every layer
    pub fn mark_all(&mut self, flags: LayerFlags) {
        for layer in self.layers.values_mut() {
            layer.mark(flags);
        }
    }
}
