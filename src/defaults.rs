//! Default configuration constants for voxbatch.
//!
//! Shared by the TOML config, the scheduler config and the voice adapters so
//! every entry point agrees on the same values.

/// Default number of utterances per inference batch.
pub const BATCH_SIZE: usize = 4;

/// Default number of batches allowed in flight ahead of the consumer.
///
/// Bounds the reorder buffer to `LOOKAHEAD * BATCH_SIZE` results.
pub const LOOKAHEAD: usize = 2;

/// Default maximum padded token width of a batch.
///
/// A single utterance longer than this still runs, alone in its own batch.
pub const MAX_PADDED_WIDTH: usize = 512;

/// Default number of inference worker threads (0 runs inference inline).
pub const WORKERS: usize = 2;

/// Reserved token used to pad rows of a batch to a common width.
pub const PAD_TOKEN: i64 = 0;

/// Default buffer size for background and async delivery channels.
pub const DELIVERY_BUFFER: usize = 8;

/// Fallback length scale when neither request nor voice sets one.
pub const LENGTH_SCALE: f32 = 1.0;

/// Fallback noise scale when neither request nor voice sets one.
pub const NOISE_SCALE: f32 = 0.667;

/// Fallback noise width when neither request nor voice sets one.
pub const NOISE_W: f32 = 0.8;

/// Phoneme marking the beginning of an utterance in piper-style voices.
pub const BOS_PHONEME: char = '^';

/// Phoneme marking the end of an utterance in piper-style voices.
pub const EOS_PHONEME: char = '$';

/// Phoneme interleaved between phonemes in piper-style voices.
pub const PAD_PHONEME: char = '_';

/// Environment variable prefix for config overrides.
pub const ENV_PREFIX: &str = "VOXBATCH";
