//! Vertex Store & slot allocation
//!
//! Every layer keeps five flat attribute arrays. One sprite occupies one *slot*:
//! six vertices (two triangles) of four floats in each array, so a slot is a
//! fixed block of [`FLOATS_PER_SLOT`] floats per attribute.
//!
//! Slots are handed out from an explicit free list. When it runs dry the arrays
//! grow by a fixed chunk of slots; they never shrink or compact, so a slot index
//! is stable for as long as its sprite lives. Growth raises the *extend* flag,
//! which tells the next draw to recreate the device buffers instead of patching
//! them.

use std::ops::Range;

use thiserror::Error;

use crate::foundation::collections::FreeList;

/// Vertices per sprite quad
pub const VERTICES_PER_QUAD: usize = 6;

/// Floats per vertex in every attribute
pub const COMPONENTS: usize = 4;

/// Floats per slot in every attribute
pub const FLOATS_PER_SLOT: usize = VERTICES_PER_QUAD * COMPONENTS;

/// Value written across a released slot
pub const SENTINEL: f32 = -1.0;

/// One attribute's data for one slot
pub type QuadBlock = [f32; FLOATS_PER_SLOT];

/// Result type for vertex store operations
pub type VertexResult<T> = Result<T, VertexError>;

/// Errors reported by the vertex store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VertexError {
    /// Slot index past the end of the arrays
    #[error("Slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange {
        /// Offending slot
        slot: usize,
        /// Current capacity in slots
        capacity: usize,
    },

    /// Slot is on the free list
    #[error("Slot {0} is not allocated")]
    SlotNotAllocated(usize),
}

/// Per-vertex attribute streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Quad corner position (x, y) and its unit texture-space coordinate (u, v)
    Position,
    /// Sprite extent: x, y, width, height (rotation pivot)
    Property,
    /// Rotation in degrees, opacity, atlas page, unused
    Property2,
    /// Atlas source rectangle, or -1 for a flat color fill
    TexCoord,
    /// Normalized RGBA fill color
    Color,
}

impl Attribute {
    /// All attributes in binding order
    pub const ALL: [Self; 5] = [
        Self::Position,
        Self::Property,
        Self::Property2,
        Self::TexCoord,
        Self::Color,
    ];

    /// Shader attribute name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Position => "a_position",
            Self::Property => "a_property",
            Self::Property2 => "a_property2",
            Self::TexCoord => "a_texCoord",
            Self::Color => "a_color",
        }
    }

    /// Array index of this attribute
    pub const fn index(self) -> usize {
        match self {
            Self::Position => 0,
            Self::Property => 1,
            Self::Property2 => 2,
            Self::TexCoord => 3,
            Self::Color => 4,
        }
    }

    /// Value a freshly allocated slot starts with
    const fn initial_value(self) -> f32 {
        match self {
            Self::TexCoord => SENTINEL,
            _ => 0.0,
        }
    }
}

/// Repeat one vertex value across all six vertices of a quad
pub fn uniform_block(value: [f32; COMPONENTS]) -> QuadBlock {
    let mut block = [0.0; FLOATS_PER_SLOT];
    for vertex in block.chunks_exact_mut(COMPONENTS) {
        vertex.copy_from_slice(&value);
    }
    block
}

/// Corner positions of a quad in vertex order TL, TR, BL, BL, TR, BR
///
/// Each vertex is (x, y, u, v) with u, v the unit corner coordinate.
pub fn quad_positions(x: f32, y: f32, width: f32, height: f32) -> QuadBlock {
    let (right, bottom) = (x + width, y + height);
    let corners = [
        [x, y, 0.0, 0.0],
        [right, y, 1.0, 0.0],
        [x, bottom, 0.0, 1.0],
        [x, bottom, 0.0, 1.0],
        [right, y, 1.0, 0.0],
        [right, bottom, 1.0, 1.0],
    ];
    let mut block = [0.0; FLOATS_PER_SLOT];
    for (vertex, corner) in block.chunks_exact_mut(COMPONENTS).zip(corners) {
        vertex.copy_from_slice(&corner);
    }
    block
}

/// Flat per-layer attribute arrays with stable slots
#[derive(Debug, Clone)]
pub struct VertexStore {
    arrays: [Vec<f32>; 5],
    free: FreeList,
    chunk_slots: usize,
    live: usize,
    peak_live: usize,
    extend_pending: bool,
    dirty: [Option<Range<usize>>; 5],
    writes: u64,
}

impl VertexStore {
    /// Create an empty store that grows by `chunk_slots` quads at a time
    pub fn new(chunk_slots: usize) -> Self {
        Self {
            arrays: Default::default(),
            free: FreeList::new(),
            chunk_slots: chunk_slots.max(1),
            live: 0,
            peak_live: 0,
            extend_pending: false,
            dirty: Default::default(),
            writes: 0,
        }
    }

    /// Reserve a slot, reusing a freed one before growing
    ///
    /// The block is initialised to zeros with a flat-fill texture coordinate.
    pub fn allocate(&mut self) -> usize {
        let slot = if let Some(slot) = self.free.pop() {
            slot
        } else {
            let first = self.capacity();
            let grown = (first + self.chunk_slots) * FLOATS_PER_SLOT;
            for array in &mut self.arrays {
                array.resize(grown, SENTINEL);
            }
            self.free.extend_range(first + 1..first + self.chunk_slots);
            self.extend_pending = true;
            log::debug!(
                "Vertex store grew to {} slots ({} floats per attribute)",
                self.capacity(),
                grown
            );
            first
        };

        for attribute in Attribute::ALL {
            self.fill(slot, attribute, attribute.initial_value());
        }

        self.live += 1;
        self.peak_live = self.peak_live.max(self.live);
        slot
    }

    /// Write the sentinel across a slot and make it reusable
    pub fn release(&mut self, slot: usize) -> VertexResult<()> {
        self.check_allocated(slot)?;
        for attribute in Attribute::ALL {
            self.fill(slot, attribute, SENTINEL);
        }
        self.free.push(slot);
        self.live -= 1;
        Ok(())
    }

    /// Overwrite one attribute's block for a slot
    pub fn write(&mut self, slot: usize, attribute: Attribute, values: &QuadBlock) -> VertexResult<()> {
        self.check_allocated(slot)?;
        let range = Self::float_range(slot);
        self.arrays[attribute.index()][range].copy_from_slice(values);
        self.mark_dirty(attribute, slot);
        self.writes += 1;
        log::trace!("Wrote {} for slot {}", attribute.name(), slot);
        Ok(())
    }

    /// One attribute's block for a slot
    pub fn block(&self, slot: usize, attribute: Attribute) -> Option<&[f32]> {
        self.arrays[attribute.index()].get(Self::float_range(slot))
    }

    /// Full array of one attribute
    pub fn attribute(&self, attribute: Attribute) -> &[f32] {
        &self.arrays[attribute.index()]
    }

    /// Slots currently backed by the arrays
    pub fn capacity(&self) -> usize {
        self.arrays[0].len() / FLOATS_PER_SLOT
    }

    /// Slots currently in use
    pub const fn live(&self) -> usize {
        self.live
    }

    /// Highest number of simultaneously live slots ever seen
    pub const fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Growth chunk in slots
    pub const fn chunk_slots(&self) -> usize {
        self.chunk_slots
    }

    /// Number of vertices to submit when drawing the whole store
    pub fn vertex_count(&self) -> usize {
        self.capacity() * VERTICES_PER_QUAD
    }

    /// Attribute block writes since creation
    pub const fn write_count(&self) -> u64 {
        self.writes
    }

    /// Whether `slot` is allocated
    pub fn is_allocated(&self, slot: usize) -> bool {
        slot < self.capacity() && !self.free.contains(slot)
    }

    /// Consume the extend flag raised by growth
    pub fn take_extend(&mut self) -> bool {
        std::mem::take(&mut self.extend_pending)
    }

    /// Consume the dirty float range of one attribute
    pub fn take_dirty(&mut self, attribute: Attribute) -> Option<Range<usize>> {
        self.dirty[attribute.index()].take()
    }

    /// Forget all dirty ranges (after a full upload)
    pub fn clear_dirty(&mut self) {
        self.dirty = Default::default();
    }

    fn fill(&mut self, slot: usize, attribute: Attribute, value: f32) {
        let range = Self::float_range(slot);
        self.arrays[attribute.index()][range].fill(value);
        self.mark_dirty(attribute, slot);
    }

    fn mark_dirty(&mut self, attribute: Attribute, slot: usize) {
        let range = Self::float_range(slot);
        let entry = &mut self.dirty[attribute.index()];
        *entry = Some(match entry.take() {
            Some(existing) => existing.start.min(range.start)..existing.end.max(range.end),
            None => range,
        });
    }

    fn check_allocated(&self, slot: usize) -> VertexResult<()> {
        let capacity = self.capacity();
        if slot >= capacity {
            return Err(VertexError::SlotOutOfRange { slot, capacity });
        }
        if self.free.contains(slot) {
            return Err(VertexError::SlotNotAllocated(slot));
        }
        Ok(())
    }

    const fn float_range(slot: usize) -> Range<usize> {
        slot * FLOATS_PER_SLOT..(slot + 1) * FLOATS_PER_SLOT
    }
}
