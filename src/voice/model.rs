//! Voice model handle: the inference capability the scheduler drives.

use crate::error::{Result, SynthError};
use crate::pipeline::types::{Batch, SynthesisParams};
use crate::voice::config::VoiceConfig;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Trait for batched speech inference (acoustic model + vocoder).
///
/// Implementations are shared read-only across worker threads; the
/// scheduler never mutates model state, so `infer` takes `&self`.
pub trait VoiceModel: Send + Sync {
    /// Output sample rate, constant for the lifetime of the model.
    fn sample_rate(&self) -> u32;

    /// Synthesize every item of `batch`.
    ///
    /// Must return exactly one waveform per item, in batch order, with
    /// padding-induced frames already trimmed. An `Err` fails the whole batch.
    fn infer(&self, batch: &Batch) -> Result<Vec<Vec<f32>>>;

    /// Name of the loaded voice, for diagnostics.
    fn model_name(&self) -> &str;

    /// Check if the model is loaded and usable.
    fn is_ready(&self) -> bool;

    /// Speaker table (id → name) for multi-speaker voices.
    fn speakers(&self) -> Option<&HashMap<i64, String>> {
        None
    }

    /// Language code of the voice, if known.
    fn language(&self) -> Option<&str> {
        None
    }

    /// Parameters used for any field a request leaves unset.
    fn default_params(&self) -> SynthesisParams {
        SynthesisParams::default()
    }
}

/// Implement VoiceModel for Arc<T> to allow sharing one loaded voice.
impl<T: VoiceModel> VoiceModel for Arc<T> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn infer(&self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        (**self).infer(batch)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn speakers(&self) -> Option<&HashMap<i64, String>> {
        (**self).speakers()
    }

    fn language(&self) -> Option<&str> {
        (**self).language()
    }

    fn default_params(&self) -> SynthesisParams {
        (**self).default_params()
    }
}

/// Mock voice model for testing.
///
/// Produces `samples_per_token` samples per unpadded token, filled with
/// `0.001 * (sequence_index + 1)` so tests can tell segments apart. Clones
/// share the call log and concurrency counters.
#[derive(Debug, Clone)]
pub struct MockVoiceModel {
    model_name: String,
    sample_rate: u32,
    samples_per_token: usize,
    ready: bool,
    speakers: Option<HashMap<i64, String>>,
    language: Option<String>,
    default_params: SynthesisParams,
    batch_delays: HashMap<u64, Duration>,
    failing_batches: HashSet<u64>,
    panicking_batches: HashSet<u64>,
    drop_last_waveform: bool,
    calls: Arc<Mutex<Vec<Vec<u64>>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockVoiceModel {
    /// Create a new mock model with default settings (22.05kHz, 10 samples/token).
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            sample_rate: 22050,
            samples_per_token: 10,
            ready: true,
            speakers: None,
            language: None,
            default_params: SynthesisParams::default(),
            batch_delays: HashMap::new(),
            failing_batches: HashSet::new(),
            panicking_batches: HashSet::new(),
            drop_last_waveform: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock that reports the metadata of a parsed voice description.
    pub fn from_config(model_name: &str, config: &VoiceConfig) -> Self {
        let speakers = config.speaker_names();
        Self {
            sample_rate: config.audio.sample_rate,
            speakers: (!speakers.is_empty()).then_some(speakers),
            language: config.language_code().map(str::to_string),
            default_params: config.default_params(),
            ..Self::new(model_name)
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_samples_per_token(mut self, samples_per_token: usize) -> Self {
        self.samples_per_token = samples_per_token;
        self
    }

    /// Sleep for `delay` before completing batch `batch_id`.
    pub fn with_batch_delay(mut self, batch_id: u64, delay: Duration) -> Self {
        self.batch_delays.insert(batch_id, delay);
        self
    }

    /// Return an error for batch `batch_id`.
    pub fn with_failing_batch(mut self, batch_id: u64) -> Self {
        self.failing_batches.insert(batch_id);
        self
    }

    /// Panic while processing batch `batch_id`.
    pub fn with_panicking_batch(mut self, batch_id: u64) -> Self {
        self.panicking_batches.insert(batch_id);
        self
    }

    /// Return one waveform fewer than the batch has items.
    pub fn with_short_output(mut self) -> Self {
        self.drop_last_waveform = true;
        self
    }

    /// Report the model as not loaded.
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Sequence indices of every batch received, in call order.
    pub fn calls(&self) -> Vec<Vec<u64>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest number of batches observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl VoiceModel for MockVoiceModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn infer(&self, batch: &Batch) -> Result<Vec<Vec<f32>>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.sequence_indices());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(delay) = self.batch_delays.get(&batch.batch_id) {
            thread::sleep(*delay);
        }

        let result = if self.panicking_batches.contains(&batch.batch_id) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            panic!("mock inference panic in batch {}", batch.batch_id);
        } else if self.failing_batches.contains(&batch.batch_id) {
            Err(SynthError::Other(format!(
                "mock inference failure in batch {}",
                batch.batch_id
            )))
        } else {
            let mut waveforms: Vec<Vec<f32>> = batch
                .items
                .iter()
                .zip(&batch.item_lengths)
                .map(|(item, &len)| {
                    let amplitude = 0.001 * (item.sequence_index as f32 + 1.0);
                    vec![amplitude; len * self.samples_per_token]
                })
                .collect();
            if self.drop_last_waveform {
                waveforms.pop();
            }
            Ok(waveforms)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn speakers(&self) -> Option<&HashMap<i64, String>> {
        self.speakers.as_ref()
    }

    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    fn default_params(&self) -> SynthesisParams {
        self.default_params
    }
}
