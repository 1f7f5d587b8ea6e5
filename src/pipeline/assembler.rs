//! Batch assembler: groups encoded utterances into padded inference batches.
//!
//! Items are batched strictly in arrival order. A batch closes when it holds
//! `batch_size` items, when the next item would widen it past
//! `max_padded_width`, or when upstream is exhausted.

use crate::defaults;
use crate::pipeline::types::{Batch, EncodedUtterance};
use std::collections::VecDeque;

/// Configuration for batch assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerConfig {
    /// Maximum items per batch (B).
    pub batch_size: usize,
    /// Maximum padded token width of a multi-item batch.
    pub max_padded_width: usize,
    /// Token used to pad rows.
    pub pad_token: i64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            max_padded_width: defaults::MAX_PADDED_WIDTH,
            pad_token: defaults::PAD_TOKEN,
        }
    }
}

/// Accumulates encoded utterances and hands out closed batches.
#[derive(Debug)]
pub struct BatchAssembler {
    config: AssemblerConfig,
    pending: Vec<EncodedUtterance>,
    pending_width: usize,
    ready: VecDeque<Batch>,
    next_batch_id: u64,
}

impl BatchAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config: AssemblerConfig {
                batch_size: config.batch_size.max(1),
                max_padded_width: config.max_padded_width.max(1),
                ..config
            },
            pending: Vec::new(),
            pending_width: 0,
            ready: VecDeque::new(),
            next_batch_id: 0,
        }
    }

    /// Adds the next item in sequence order, closing batches as needed.
    pub fn push(&mut self, item: EncodedUtterance) {
        let width = self.pending_width.max(item.len());
        if !self.pending.is_empty() && width > self.config.max_padded_width {
            self.close();
        }

        self.pending_width = self.pending_width.max(item.len());
        self.pending.push(item);

        if self.pending.len() >= self.config.batch_size {
            self.close();
        }
    }

    /// Closes the partial batch, if any. Called once upstream is exhausted,
    /// or to flush items held behind buffered encoding failures.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.close();
        }
    }

    /// Takes the oldest closed batch.
    pub fn pop_ready(&mut self) -> Option<Batch> {
        self.ready.pop_front()
    }

    /// Number of items waiting for their batch to close.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when neither open items nor closed batches remain.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.ready.is_empty()
    }

    /// Drops everything not yet handed out.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.pending_width = 0;
        self.ready.clear();
    }

    fn close(&mut self) {
        let items = std::mem::take(&mut self.pending);
        let batch = pad_batch(self.next_batch_id, items, self.config.pad_token);
        self.next_batch_id += 1;
        self.pending_width = 0;
        self.ready.push_back(batch);
    }
}

/// Builds a batch whose rows are padded to the longest item.
pub fn pad_batch(batch_id: u64, items: Vec<EncodedUtterance>, pad_token: i64) -> Batch {
    let width = items.iter().map(EncodedUtterance::len).max().unwrap_or(0);
    let item_lengths: Vec<usize> = items.iter().map(EncodedUtterance::len).collect();
    let padded_tokens = items
        .iter()
        .map(|item| {
            let mut row = Vec::with_capacity(width);
            row.extend_from_slice(&item.token_ids);
            row.resize(width, pad_token);
            row
        })
        .collect();
    Batch {
        batch_id,
        items,
        padded_tokens,
        item_lengths,
    }
}
