//! Stream controller: drives splitting, batching and inference on demand.
//!
//! Each pull on a `SpeechStream` does a bounded amount of work: it tops up
//! batch submissions while fewer than `lookahead` batches are outstanding,
//! then returns the next result in sequence order, blocking on the executor
//! only when that result is not buffered yet. A batch stays outstanding from
//! submission until all of its items have been handed to the caller, so the
//! reorder buffer never holds more than `lookahead` batches' worth of audio.
//! Encoding failures wait in the same buffer; at most one batch size of them
//! is held before the splitter stops being pulled.

use crate::error::{Result, SynthError};
use crate::pipeline::assembler::{AssemblerConfig, BatchAssembler};
use crate::pipeline::error::ErrorReporter;
use crate::pipeline::executor::{BatchOutcome, Executor};
use crate::pipeline::reorderer::Reorderer;
use crate::pipeline::types::{AudioSegment, Batch, EncodedUtterance};
use crate::text::UtteranceSplitter;
use crate::voice::PhonemeEncoder;
use std::collections::HashMap;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const STAGE: &str = "controller";

/// Cloneable cancellation flag, usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters describing one stream's scheduling so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub batches_submitted: u64,
    pub batches_completed: u64,
    /// Batches dropped unrun or whose results were thrown away on cancel.
    pub batches_discarded: u64,
    /// Highest number of outstanding batches observed.
    pub max_outstanding: usize,
    pub segments_emitted: u64,
    pub errors_emitted: u64,
}

/// A buffered result and the batch it came from, if any.
#[derive(Debug)]
struct Slot {
    batch_id: Option<u64>,
    result: Result<AudioSegment>,
}

/// Lazy, single-pass sequence of per-utterance results in input order.
pub struct SpeechStream {
    splitter: UtteranceSplitter,
    splitter_done: bool,
    encoder: Arc<dyn PhonemeEncoder>,
    assembler: BatchAssembler,
    executor: Executor,
    reorderer: Reorderer<Slot>,
    /// batch_id → items not yet delivered.
    outstanding: HashMap<u64, usize>,
    /// Submitted batches whose outcome has not been received.
    in_flight: usize,
    /// Encoding failures buffered and not yet delivered.
    buffered_failures: usize,
    failure_cap: usize,
    lookahead: usize,
    cancel: CancelHandle,
    finished: bool,
    stats: StreamStats,
    reporter: Arc<dyn ErrorReporter>,
}

impl SpeechStream {
    pub fn new(
        splitter: UtteranceSplitter,
        encoder: Arc<dyn PhonemeEncoder>,
        executor: Executor,
        assembler: AssemblerConfig,
        lookahead: usize,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            splitter,
            splitter_done: false,
            encoder,
            assembler: BatchAssembler::new(assembler),
            executor,
            reorderer: Reorderer::new(),
            outstanding: HashMap::new(),
            in_flight: 0,
            buffered_failures: 0,
            failure_cap: assembler.batch_size.max(1),
            lookahead: lookahead.max(1),
            cancel: CancelHandle::new(),
            finished: false,
            stats: StreamStats::default(),
            reporter,
        }
    }

    /// Handle that cancels this stream from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Same as `cancel_handle().cancel()`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Batches submitted whose items have not all been delivered.
    pub fn outstanding_batches(&self) -> usize {
        self.outstanding.len()
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Results held for in-order delivery, successes and failures alike.
    pub fn buffered_results(&self) -> usize {
        self.reorderer.pending_len()
    }

    fn pull(&mut self) -> Option<Result<AudioSegment>> {
        if self.finished {
            return None;
        }

        loop {
            // Also catches a cancel that arrived while blocked on the executor
            if self.cancel.is_cancelled() {
                return self.wind_down();
            }
            if let Err(e) = self.top_up() {
                self.reporter.report(STAGE, &e);
                self.finished = true;
                return Some(Err(e));
            }

            if let Some((index, slot)) = self.reorderer.pop_ready() {
                if slot.batch_id.is_none() {
                    self.buffered_failures = self.buffered_failures.saturating_sub(1);
                }
                self.release(slot.batch_id);
                if self.cancel.is_cancelled() {
                    return self.wind_down();
                }
                return Some(self.emit(index, slot.result));
            }

            if self.in_flight == 0 {
                if self.cancel.is_cancelled() {
                    return self.wind_down();
                }
                self.finished = true;
                if self.reorderer.is_empty() && self.is_exhausted() {
                    return None;
                }
                let error = SynthError::Other(format!(
                    "stream stalled waiting for utterance {}",
                    self.reorderer.next_expected()
                ));
                self.reporter.report(STAGE, &error);
                return Some(Err(error));
            }

            match self.executor.next_completed() {
                Ok(outcome) => {
                    self.in_flight -= 1;
                    self.accept(outcome);
                }
                Err(e) => {
                    self.reporter.report(STAGE, &e);
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Submits batches until `lookahead` are outstanding or input runs out.
    fn top_up(&mut self) -> Result<()> {
        while self.outstanding.len() < self.lookahead && !self.cancel.is_cancelled() {
            let Some(batch) = self.next_batch() else {
                break;
            };
            self.submit(batch)?;
        }
        Ok(())
    }

    fn submit(&mut self, batch: Batch) -> Result<()> {
        self.reporter.trace(
            STAGE,
            &format!(
                "submit batch {} items {:?} width {}",
                batch.batch_id,
                batch.sequence_indices(),
                batch.width()
            ),
        );
        self.outstanding.insert(batch.batch_id, batch.len());
        self.executor.submit(batch)?;
        self.in_flight += 1;
        self.stats.batches_submitted += 1;
        self.stats.max_outstanding = self.stats.max_outstanding.max(self.outstanding.len());
        Ok(())
    }

    /// Produces the next closed batch, encoding utterances as needed.
    ///
    /// Encoding failures go straight into the reorder buffer at their index.
    /// Once `failure_cap` of them are waiting, the open batch is closed early
    /// and the splitter is left alone until some are delivered.
    fn next_batch(&mut self) -> Option<Batch> {
        loop {
            if let Some(batch) = self.assembler.pop_ready() {
                return Some(batch);
            }
            if self.splitter_done {
                return None;
            }
            if self.buffered_failures >= self.failure_cap {
                if self.assembler.pending_len() == 0 {
                    return None;
                }
                self.assembler.finish();
                continue;
            }

            let Some(utterance) = self.splitter.next() else {
                self.splitter_done = true;
                self.assembler.finish();
                continue;
            };

            let index = utterance.sequence_index;
            let encoded = self
                .encoder
                .encode(&utterance)
                .and_then(|tokens| EncodedUtterance::new(utterance, tokens));
            match encoded {
                Ok(item) => self.assembler.push(item),
                Err(e) => {
                    let slot = Slot {
                        batch_id: None,
                        result: Err(as_encoding_error(index, e)),
                    };
                    if self.reorderer.insert(index, slot) {
                        self.buffered_failures += 1;
                    }
                }
            }
        }
    }

    fn accept(&mut self, outcome: BatchOutcome) {
        self.stats.batches_completed += 1;
        if self.cancel.is_cancelled() {
            self.discard(outcome);
            return;
        }
        if outcome.failed() {
            self.reporter.trace(
                STAGE,
                &format!("batch {} failed for all {} items", outcome.batch_id, outcome.len()),
            );
        }

        let batch_id = outcome.batch_id;
        for (index, result) in outcome.results {
            let slot = Slot {
                batch_id: Some(batch_id),
                result,
            };
            if !self.reorderer.insert(index, slot) {
                self.reporter.report(
                    STAGE,
                    &SynthError::Other(format!(
                        "dropped duplicate result for utterance {} from batch {}",
                        index, batch_id
                    )),
                );
                self.release(Some(batch_id));
            }
        }
    }

    /// Marks one item of `batch_id` delivered.
    fn release(&mut self, batch_id: Option<u64>) {
        let Some(batch_id) = batch_id else {
            return;
        };
        if let Some(remaining) = self.outstanding.get_mut(&batch_id) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.outstanding.remove(&batch_id);
            }
        }
    }

    fn emit(&mut self, index: u64, result: Result<AudioSegment>) -> Result<AudioSegment> {
        match &result {
            Ok(_) => self.stats.segments_emitted += 1,
            Err(e) => {
                self.stats.errors_emitted += 1;
                self.reporter
                    .trace(STAGE, &format!("utterance {} failed: {}", index, e));
            }
        }
        result
    }

    fn is_exhausted(&self) -> bool {
        self.splitter_done && self.assembler.is_empty()
    }

    fn discard(&mut self, outcome: BatchOutcome) {
        self.stats.batches_discarded += 1;
        self.outstanding.remove(&outcome.batch_id);
        self.reporter.trace(
            STAGE,
            &format!(
                "discarded {} results of batch {} after cancel",
                outcome.len(),
                outcome.batch_id
            ),
        );
    }

    /// Drops buffered work, drains in-flight batches, and reports `Cancelled`.
    fn wind_down(&mut self) -> Option<Result<AudioSegment>> {
        self.finished = true;
        self.assembler.clear();
        let buffered = self.reorderer.clear();
        self.buffered_failures = 0;

        let unstarted = self.executor.discard_queued();
        self.in_flight = self.in_flight.saturating_sub(unstarted);
        self.stats.batches_discarded += unstarted as u64;

        while self.in_flight > 0 {
            match self.executor.next_completed() {
                Ok(outcome) => {
                    self.in_flight -= 1;
                    self.stats.batches_completed += 1;
                    self.discard(outcome);
                }
                Err(e) => {
                    self.reporter.report(STAGE, &e);
                    break;
                }
            }
        }
        self.outstanding.clear();
        self.in_flight = 0;

        self.reporter.trace(
            STAGE,
            &format!(
                "cancelled with {} buffered results and {} unstarted batches dropped",
                buffered, unstarted
            ),
        );
        Some(Err(SynthError::Cancelled))
    }
}

impl Iterator for SpeechStream {
    type Item = Result<AudioSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pull()
    }
}

impl FusedIterator for SpeechStream {}

impl Drop for SpeechStream {
    fn drop(&mut self) {
        // Unstarted batches would otherwise run before the workers exit
        self.executor.discard_queued();
    }
}

fn as_encoding_error(index: u64, error: SynthError) -> SynthError {
    match error {
        SynthError::Encoding { message, .. } => SynthError::Encoding { index, message },
        other => SynthError::Encoding {
            index,
            message: other.to_string(),
        },
    }
}
