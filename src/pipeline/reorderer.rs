//! Result reorderer: restores sequence order to out-of-order completions.
//!
//! Holds only the "missing piece" window: results that arrived before their
//! predecessors. Memory is bounded by the controller's lookahead.

use std::collections::BTreeMap;

/// Reassembly buffer keyed by sequence index.
#[derive(Debug)]
pub struct Reorderer<T> {
    /// Results waiting for their turn.
    pending: BTreeMap<u64, T>,
    /// Next index to hand out.
    next_expected: u64,
}

impl<T> Default for Reorderer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reorderer<T> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: 0,
        }
    }

    /// Buffers `value` at `index`.
    ///
    /// Returns false (and drops `value`) if the index was already emitted
    /// or is already buffered.
    pub fn insert(&mut self, index: u64, value: T) -> bool {
        if index < self.next_expected || self.pending.contains_key(&index) {
            return false;
        }
        self.pending.insert(index, value);
        true
    }

    /// Removes and returns the entry for `next_expected`, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(u64, T)> {
        let value = self.pending.remove(&self.next_expected)?;
        let index = self.next_expected;
        self.next_expected += 1;
        Some((index, value))
    }

    /// True if the next index to emit is buffered.
    pub fn has_ready(&self) -> bool {
        self.pending.contains_key(&self.next_expected)
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Number of buffered, not yet emitted results.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discards every buffered result. `next_expected` is unchanged.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
