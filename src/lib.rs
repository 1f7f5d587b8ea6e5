//! voxbatch - batched, streaming text-to-speech scheduling
//!
//! Splits text into utterances, groups them into padded inference batches,
//! runs a bounded number of batches ahead of the consumer, and delivers one
//! audio segment per utterance in input order.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod synthesizer;
pub mod text;
pub mod voice;

// Entry point
pub use synthesizer::SpeechSynthesizer;

// Streams and their data
pub use pipeline::controller::{CancelHandle, SpeechStream, StreamStats};
pub use pipeline::delivery::{AsyncSpeechStream, BackgroundStream};
pub use pipeline::types::{AudioSegment, SynthesisParams, Utterance};

// Voice collaborators
pub use voice::{
    MockEncoder, MockVoiceModel, PhonemeEncoder, PhonemeIdEncoder, VoiceConfig, VoiceModel,
};

// Error handling
pub use error::{Result, SynthError};

// Config
pub use config::{Config, SchedulerConfig};

// Diagnostics
pub use pipeline::error::{ErrorReporter, LogReporter};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
