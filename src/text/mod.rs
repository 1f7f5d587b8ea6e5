//! Text handling ahead of synthesis.

pub mod splitter;

pub use splitter::{UtteranceSplitter, decode_text, validate_text};
