//! Voice collaborators: the model handle, its description and phoneme encoders.

pub mod config;
pub mod encoder;
pub mod model;

pub use config::VoiceConfig;
pub use encoder::{MockEncoder, PhonemeEncoder, PhonemeIdEncoder};
pub use model::{MockVoiceModel, VoiceModel};
