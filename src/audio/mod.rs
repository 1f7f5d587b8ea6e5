//! Audio output for synthesized segments.

pub mod wav;

pub use wav::{SegmentWriter, wav_spec};
