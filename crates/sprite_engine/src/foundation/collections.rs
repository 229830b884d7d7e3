//! Specialized collection types

/// Free list of reusable indices
///
/// Indices are handed out last-in first-out, so an index that was just released
/// is the next one reused. Membership is tracked per index, so every operation
/// is O(1).
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    free_indices: Vec<usize>,
    is_free: Vec<bool>,
}

impl FreeList {
    /// Create an empty free list
    pub const fn new() -> Self {
        Self {
            free_indices: Vec::new(),
            is_free: Vec::new(),
        }
    }

    /// Take the next reusable index, if any
    pub fn pop(&mut self) -> Option<usize> {
        let index = self.free_indices.pop()?;
        self.is_free[index] = false;
        Some(index)
    }

    /// Return an index to the list
    pub fn push(&mut self, index: usize) {
        debug_assert!(!self.contains(index), "index {index} released twice");
        self.mark_free(index);
        self.free_indices.push(index);
    }

    /// Add a freshly grown range so that its lowest index is handed out first
    pub fn extend_range(&mut self, range: std::ops::Range<usize>) {
        for index in range.clone() {
            self.mark_free(index);
        }
        self.free_indices.extend(range.rev());
    }

    fn mark_free(&mut self, index: usize) {
        if index >= self.is_free.len() {
            self.is_free.resize(index + 1, false);
        }
        self.is_free[index] = true;
    }

    /// Number of reusable indices
    pub fn len(&self) -> usize {
        self.free_indices.len()
    }

    /// Whether no index is available
    pub fn is_empty(&self) -> bool {
        self.free_indices.is_empty()
    }

    /// Whether `index` is currently free
    pub fn contains(&self, index: usize) -> bool {
        self.is_free.get(index).copied().unwrap_or(false)
    }
}
