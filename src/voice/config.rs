//! Piper-style voice description (`<voice>.onnx.json`).
//!
//! Only the fields the scheduler and its adapters need are read; everything
//! else in the file is ignored.

use crate::error::{Result, SynthError};
use crate::pipeline::types::SynthesisParams;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VoiceAudio {
    pub sample_rate: u32,
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VoiceLanguage {
    pub code: String,
}

/// Default inference scales shipped with the voice.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceScales {
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_w: f32,
}

impl Default for InferenceScales {
    fn default() -> Self {
        Self {
            noise_scale: crate::defaults::NOISE_SCALE,
            length_scale: crate::defaults::LENGTH_SCALE,
            noise_w: crate::defaults::NOISE_W,
        }
    }
}

/// Voice description as written next to the model weights.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub key: Option<String>,
    pub audio: VoiceAudio,
    pub language: Option<VoiceLanguage>,
    pub num_speakers: u32,
    pub speaker_id_map: HashMap<String, i64>,
    pub inference: InferenceScales,
    pub phoneme_id_map: HashMap<char, Vec<i64>>,
}

impl VoiceConfig {
    /// Parse and validate a voice description from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VoiceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a voice description file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| SynthError::VoiceModel {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&contents)
    }

    /// Checks the fields the scheduler depends on.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(SynthError::VoiceModel {
                message: "audio.sample_rate must be positive".to_string(),
            });
        }
        if let Some((name, id)) = self
            .speaker_id_map
            .iter()
            .find(|(_, id)| **id < 0 || (self.num_speakers > 0 && **id >= self.num_speakers as i64))
        {
            return Err(SynthError::VoiceModel {
                message: format!(
                    "speaker {:?} has id {} outside 0..{}",
                    name, id, self.num_speakers
                ),
            });
        }
        Ok(())
    }

    /// Speaker table keyed by id.
    pub fn speaker_names(&self) -> HashMap<i64, String> {
        self.speaker_id_map
            .iter()
            .map(|(name, id)| (*id, name.clone()))
            .collect()
    }

    /// Looks up a speaker id by name.
    pub fn speaker_id(&self, name: &str) -> Option<i64> {
        self.speaker_id_map.get(name).copied()
    }

    pub fn language_code(&self) -> Option<&str> {
        self.language
            .as_ref()
            .map(|l| l.code.as_str())
            .filter(|code| !code.is_empty())
    }

    /// The voice's own scales; multi-speaker voices default to speaker 0.
    pub fn default_params(&self) -> SynthesisParams {
        SynthesisParams {
            speaker_id: (self.num_speakers > 1).then_some(0),
            length_scale: Some(self.inference.length_scale),
            noise_scale: Some(self.inference.noise_scale),
            noise_w: Some(self.inference.noise_w),
            sentence_silence_seconds: None,
        }
    }
}
