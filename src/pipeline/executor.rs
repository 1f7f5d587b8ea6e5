//! Inference executor: runs closed batches against the voice model.
//!
//! Two modes share one interface. `Inline` runs a batch on the caller's
//! thread when its result is requested. `Pool` feeds a fixed set of named
//! worker threads and hands back outcomes in completion order, which may
//! differ from submission order.

use crate::error::{Result, SynthError};
use crate::pipeline::error::ErrorReporter;
use crate::pipeline::station::{Station, StationRunner};
use crate::pipeline::types::{AudioSegment, Batch};
use crate::voice::VoiceModel;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Every per-item result of one batch, in batch order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: u64,
    pub results: Vec<(u64, Result<AudioSegment>)>,
    /// Wall time of the inference call.
    pub inference_ms: f32,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True if the model call failed for the whole batch.
    pub fn failed(&self) -> bool {
        self.results
            .iter()
            .all(|(_, r)| matches!(r, Err(SynthError::Inference { .. })))
            && !self.results.is_empty()
    }
}

/// Runs one batch and converts the model output into per-item results.
///
/// A model error, a panic inside the model, or a waveform count that does
/// not match the batch fails every item with `SynthError::Inference`.
pub fn run_batch(model: &dyn VoiceModel, batch: Batch) -> BatchOutcome {
    let start = Instant::now();
    let output = panic::catch_unwind(AssertUnwindSafe(|| model.infer(&batch)));
    let inference_ms = start.elapsed().as_secs_f32() * 1000.0;

    let waveforms = match output {
        Ok(Ok(waveforms)) if waveforms.len() == batch.len() => Ok(waveforms),
        Ok(Ok(waveforms)) => Err(format!(
            "model returned {} waveforms for {} items",
            waveforms.len(),
            batch.len()
        )),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("model panicked: {}", panic_message(payload.as_ref()))),
    };

    let batch_id = batch.batch_id;
    let results = match waveforms {
        Ok(waveforms) => {
            let sample_rate = model.sample_rate();
            batch
                .items
                .into_iter()
                .zip(waveforms)
                .map(|(item, samples)| {
                    let mut segment =
                        AudioSegment::new(item.sequence_index, item.text, samples, sample_rate)
                            .with_inference_ms(inference_ms);
                    if let Some(seconds) = item.params.sentence_silence_seconds {
                        segment.append_silence(seconds);
                    }
                    (item.sequence_index, Ok(segment))
                })
                .collect()
        }
        Err(message) => batch
            .items
            .iter()
            .map(|item| {
                let error = SynthError::Inference {
                    batch_id,
                    index: item.sequence_index,
                    message: message.clone(),
                };
                (item.sequence_index, Err(error))
            })
            .collect(),
    };

    BatchOutcome {
        batch_id,
        results,
        inference_ms,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Station wrapping the voice model for pool workers.
pub struct InferenceStation {
    model: Arc<dyn VoiceModel>,
    reporter: Arc<dyn ErrorReporter>,
}

impl InferenceStation {
    pub fn new(model: Arc<dyn VoiceModel>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { model, reporter }
    }
}

impl Station for InferenceStation {
    type Input = Batch;
    type Output = BatchOutcome;

    fn process(&mut self, batch: Batch) -> Option<BatchOutcome> {
        let outcome = run_batch(self.model.as_ref(), batch);
        self.reporter.trace(
            self.name(),
            &format!(
                "batch {} ({} items) finished in {:.1} ms",
                outcome.batch_id,
                outcome.len(),
                outcome.inference_ms
            ),
        );
        Some(outcome)
    }

    fn name(&self) -> &'static str {
        "inference"
    }
}

/// Fixed pool of inference workers sharing one submission queue.
pub struct WorkerPool {
    submit_tx: Option<Sender<Batch>>,
    /// Kept to pull back batches no worker has started yet.
    queue_rx: Receiver<Batch>,
    done_rx: Receiver<BatchOutcome>,
    runners: Vec<StationRunner<InferenceStation>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl WorkerPool {
    /// Spawns `workers` threads. `capacity` bounds the submission queue.
    pub fn spawn(
        model: Arc<dyn VoiceModel>,
        workers: usize,
        capacity: usize,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let (submit_tx, submit_rx) = bounded(capacity.max(1));
        // Unbounded so a worker never blocks on a consumer that is itself
        // waiting to submit.
        let (done_tx, done_rx) = unbounded();

        let mut runners = Vec::with_capacity(workers.max(1));
        for ordinal in 0..workers.max(1) {
            let station = InferenceStation::new(model.clone(), reporter.clone());
            let runner =
                StationRunner::spawn(station, ordinal, submit_rx.clone(), done_tx.clone())?;
            runners.push(runner);
        }

        Ok(Self {
            submit_tx: Some(submit_tx),
            queue_rx: submit_rx,
            done_rx,
            runners,
            reporter,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.runners.len()
    }

    pub fn submit(&self, batch: Batch) -> Result<()> {
        let tx = self.submit_tx.as_ref().ok_or_else(Self::stopped)?;
        tx.send(batch).map_err(|_| Self::stopped())
    }

    /// Blocks until some worker finishes a batch.
    pub fn recv(&self) -> Result<BatchOutcome> {
        self.done_rx.recv().map_err(|_| Self::stopped())
    }

    /// Removes batches still waiting for a worker. Returns how many.
    pub fn discard_queued(&self) -> usize {
        self.queue_rx.try_iter().count()
    }

    /// Closes the queue and joins every worker. Idempotent.
    pub fn shutdown(&mut self) {
        self.submit_tx.take();
        for runner in self.runners.drain(..) {
            if let Err(e) = runner.join() {
                self.reporter.report("executor", &SynthError::Other(e));
            }
        }
    }

    fn stopped() -> SynthError {
        SynthError::Other("inference workers have stopped".to_string())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs batches either on the caller's thread or on a worker pool.
pub enum Executor {
    Inline {
        model: Arc<dyn VoiceModel>,
        queued: VecDeque<Batch>,
    },
    Pool(WorkerPool),
}

impl Executor {
    /// `workers == 0` selects inline execution.
    pub fn new(
        model: Arc<dyn VoiceModel>,
        workers: usize,
        capacity: usize,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        if workers == 0 {
            Ok(Self::inline(model))
        } else {
            WorkerPool::spawn(model, workers, capacity, reporter).map(Executor::Pool)
        }
    }

    pub fn inline(model: Arc<dyn VoiceModel>) -> Self {
        Executor::Inline {
            model,
            queued: VecDeque::new(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Executor::Inline { .. })
    }

    pub fn submit(&mut self, batch: Batch) -> Result<()> {
        match self {
            Executor::Inline { queued, .. } => {
                queued.push_back(batch);
                Ok(())
            }
            Executor::Pool(pool) => pool.submit(batch),
        }
    }

    /// Drops submitted batches that have not started. Returns how many.
    pub fn discard_queued(&mut self) -> usize {
        match self {
            Executor::Inline { queued, .. } => {
                let count = queued.len();
                queued.clear();
                count
            }
            Executor::Pool(pool) => pool.discard_queued(),
        }
    }

    /// Returns the next finished batch, blocking until one is available.
    ///
    /// Inline mode runs the oldest queued batch now.
    pub fn next_completed(&mut self) -> Result<BatchOutcome> {
        match self {
            Executor::Inline { model, queued } => {
                let batch = queued
                    .pop_front()
                    .ok_or_else(|| SynthError::Other("no batch in flight".to_string()))?;
                Ok(run_batch(model.as_ref(), batch))
            }
            Executor::Pool(pool) => pool.recv(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assembler::pad_batch;
    use crate::pipeline::error::CollectingReporter;
    use crate::pipeline::types::{EncodedUtterance, SynthesisParams, Utterance};
    use crate::voice::MockVoiceModel;
    use std::time::Duration;

    fn batch(batch_id: u64, indices: &[u64], params: SynthesisParams) -> Batch {
        let items = indices
            .iter()
            .map(|&i| {
                EncodedUtterance::new(Utterance::new(i, format!("u{}", i), params), vec![1; 3])
                    .unwrap()
            })
            .collect();
        pad_batch(batch_id, items, 0)
    }

    #[test]
    fn test_run_batch_builds_segments_in_batch_order() {
        let model = MockVoiceModel::new("mock").with_samples_per_token(2);
        let outcome = run_batch(&model, batch(3, &[6, 7], SynthesisParams::default()));

        assert_eq!(outcome.batch_id, 3);
        let indices: Vec<u64> = outcome.results.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![6, 7]);

        let segment = outcome.results[1].1.as_ref().unwrap();
        assert_eq!(segment.text, "u7");
        assert_eq!(segment.samples.len(), 6);
        assert_eq!(segment.sample_rate, 22050);
        assert!(segment.inference_ms.is_some());
        assert!(!outcome.failed());
    }

    #[test]
    fn test_run_batch_appends_sentence_silence() {
        let model = MockVoiceModel::new("mock")
            .with_sample_rate(1000)
            .with_samples_per_token(1);
        let params = SynthesisParams::default().with_sentence_silence(0.1);
        let outcome = run_batch(&model, batch(0, &[0], params));

        let segment = outcome.results[0].1.as_ref().unwrap();
        assert_eq!(segment.samples.len(), 3 + 100);
    }

    #[test]
    fn test_model_error_fails_every_item() {
        let model = MockVoiceModel::new("mock").with_failing_batch(1);
        let outcome = run_batch(&model, batch(1, &[2, 3], SynthesisParams::default()));

        assert!(outcome.failed());
        for (index, result) in &outcome.results {
            match result {
                Err(SynthError::Inference {
                    batch_id,
                    index: i,
                    ..
                }) => {
                    assert_eq!(*batch_id, 1);
                    assert_eq!(i, index);
                }
                other => panic!("Expected Inference error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_short_output_is_an_inference_error() {
        let model = MockVoiceModel::new("mock").with_short_output();
        let outcome = run_batch(&model, batch(0, &[0, 1], SynthesisParams::default()));

        assert!(outcome.failed());
        let message = outcome.results[0].1.as_ref().unwrap_err().to_string();
        assert!(message.contains("1 waveforms for 2 items"), "{}", message);
    }

    #[test]
    fn test_model_panic_is_contained() {
        let model = MockVoiceModel::new("mock").with_panicking_batch(0);
        let outcome = run_batch(&model, batch(0, &[0], SynthesisParams::default()));

        let message = outcome.results[0].1.as_ref().unwrap_err().to_string();
        assert!(message.contains("model panicked"), "{}", message);
        assert!(message.contains("mock inference panic"), "{}", message);
    }

    #[test]
    fn test_inline_executor_runs_in_submission_order() {
        let model = MockVoiceModel::new("mock");
        let mut executor = Executor::new(
            Arc::new(model.clone()),
            0,
            2,
            Arc::new(CollectingReporter::new()),
        )
        .unwrap();
        assert!(executor.is_inline());

        executor
            .submit(batch(0, &[0], SynthesisParams::default()))
            .unwrap();
        executor
            .submit(batch(1, &[1], SynthesisParams::default()))
            .unwrap();
        // Nothing runs until a result is requested
        assert!(model.calls().is_empty());

        assert_eq!(executor.next_completed().unwrap().batch_id, 0);
        assert_eq!(executor.next_completed().unwrap().batch_id, 1);
        assert!(executor.next_completed().is_err());
    }

    #[test]
    fn test_pool_returns_outcomes_in_completion_order() {
        let model = MockVoiceModel::new("mock").with_batch_delay(0, Duration::from_millis(150));
        let reporter = Arc::new(CollectingReporter::new());
        let mut pool = WorkerPool::spawn(Arc::new(model), 2, 2, reporter.clone()).unwrap();
        assert_eq!(pool.worker_count(), 2);

        pool.submit(batch(0, &[0], SynthesisParams::default()))
            .unwrap();
        pool.submit(batch(1, &[1], SynthesisParams::default()))
            .unwrap();

        let first = pool.recv().unwrap();
        let second = pool.recv().unwrap();
        assert_eq!((first.batch_id, second.batch_id), (1, 0));

        pool.shutdown();
        assert!(reporter.errors().is_empty());
        assert!(pool.submit(batch(2, &[2], SynthesisParams::default())).is_err());
    }

    #[test]
    fn test_discard_queued_drops_unstarted_batches() {
        let model = MockVoiceModel::new("mock");
        let mut executor = Executor::inline(Arc::new(model.clone()));
        for id in 0..3 {
            executor
                .submit(batch(id, &[id], SynthesisParams::default()))
                .unwrap();
        }
        assert_eq!(executor.discard_queued(), 3);
        assert!(executor.next_completed().is_err());
        assert!(model.calls().is_empty());
    }

    #[test]
    fn test_pool_discard_leaves_running_batch_alone() {
        let model = MockVoiceModel::new("mock").with_batch_delay(0, Duration::from_millis(100));
        let pool = WorkerPool::spawn(
            Arc::new(model.clone()),
            1,
            4,
            Arc::new(CollectingReporter::new()),
        )
        .unwrap();
        pool.submit(batch(0, &[0], SynthesisParams::default()))
            .unwrap();
        // Let the single worker pick up batch 0
        std::thread::sleep(Duration::from_millis(30));
        pool.submit(batch(1, &[1], SynthesisParams::default()))
            .unwrap();
        pool.submit(batch(2, &[2], SynthesisParams::default()))
            .unwrap();

        assert_eq!(pool.discard_queued(), 2);
        assert_eq!(pool.recv().unwrap().batch_id, 0);
        assert_eq!(model.calls(), vec![vec![0]]);
    }

    #[test]
    fn test_pool_worker_survives_model_panic() {
        let model = MockVoiceModel::new("mock").with_panicking_batch(0);
        let pool = WorkerPool::spawn(
            Arc::new(model),
            1,
            2,
            Arc::new(CollectingReporter::new()),
        )
        .unwrap();

        pool.submit(batch(0, &[0], SynthesisParams::default()))
            .unwrap();
        pool.submit(batch(1, &[1], SynthesisParams::default()))
            .unwrap();

        assert!(pool.recv().unwrap().failed());
        assert!(!pool.recv().unwrap().failed());
    }

    #[test]
    fn test_pool_traces_finished_batches() {
        let reporter = Arc::new(CollectingReporter::new());
        let pool = WorkerPool::spawn(
            Arc::new(MockVoiceModel::new("mock")),
            1,
            1,
            reporter.clone(),
        )
        .unwrap();
        pool.submit(batch(4, &[0, 1], SynthesisParams::default()))
            .unwrap();
        pool.recv().unwrap();

        let traces = reporter.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].0, "inference");
        assert!(traces[0].1.starts_with("batch 4 (2 items)"));
    }
}
