//! Batched synthesis pipeline.
//!
//! Utterances flow splitter → encoder → assembler → executor → reorderer,
//! driven by the `SpeechStream` controller one pull at a time. Inference
//! workers are stations connected by crossbeam channels; everything else runs
//! on the consuming thread.

pub mod assembler;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod reorderer;
pub mod station;
pub mod types;

pub use assembler::{AssemblerConfig, BatchAssembler};
pub use controller::{CancelHandle, SpeechStream, StreamStats};
pub use delivery::{AsyncSpeechStream, BackgroundStream};
pub use error::{CollectingReporter, ErrorReporter, LogReporter};
pub use executor::{BatchOutcome, Executor, InferenceStation, WorkerPool};
pub use reorderer::Reorderer;
pub use station::{Station, StationRunner};
pub use types::{AudioSegment, Batch, EncodedUtterance, SynthesisParams, Utterance};
