//! Phoneme encoders: utterance text → token IDs for the voice model.

use crate::defaults::{BOS_PHONEME, EOS_PHONEME, PAD_PHONEME};
use crate::error::{Result, SynthError};
use crate::pipeline::types::Utterance;
use crate::voice::config::VoiceConfig;
use std::collections::HashMap;

/// Trait for converting one utterance into model tokens.
///
/// Failures are reported per utterance (`SynthError::Encoding`) and do not
/// stop the rest of the stream.
pub trait PhonemeEncoder: Send + Sync {
    fn encode(&self, utterance: &Utterance) -> Result<Vec<i64>>;
}

impl<T: PhonemeEncoder> PhonemeEncoder for std::sync::Arc<T> {
    fn encode(&self, utterance: &Utterance) -> Result<Vec<i64>> {
        (**self).encode(utterance)
    }
}

/// Maps already-phonemized text to IDs through a voice's phoneme table.
///
/// Output layout is `BOS (id PAD)* EOS`. Phonemes missing from the table are
/// skipped; an utterance with no known phoneme is an encoding error.
#[derive(Debug, Clone)]
pub struct PhonemeIdEncoder {
    ids: HashMap<char, i64>,
    bos: i64,
    eos: i64,
    pad: i64,
}

impl PhonemeIdEncoder {
    /// Builds the encoder from a phoneme table, which must define the BOS,
    /// EOS and PAD phonemes.
    pub fn new(phoneme_id_map: &HashMap<char, Vec<i64>>) -> Result<Self> {
        let ids: HashMap<char, i64> = phoneme_id_map
            .iter()
            .filter_map(|(ph, ids)| ids.first().map(|id| (*ph, *id)))
            .collect();
        let lookup = |ph: char| {
            ids.get(&ph).copied().ok_or_else(|| SynthError::VoiceModel {
                message: format!("phoneme_id_map is missing {:?}", ph),
            })
        };
        Ok(Self {
            bos: lookup(BOS_PHONEME)?,
            eos: lookup(EOS_PHONEME)?,
            pad: lookup(PAD_PHONEME)?,
            ids,
        })
    }

    pub fn from_voice_config(config: &VoiceConfig) -> Result<Self> {
        Self::new(&config.phoneme_id_map)
    }
}

impl PhonemeEncoder for PhonemeIdEncoder {
    fn encode(&self, utterance: &Utterance) -> Result<Vec<i64>> {
        let mut tokens = Vec::with_capacity((utterance.text.len() + 1) * 2);
        tokens.push(self.bos);
        for phoneme in utterance.text.chars() {
            if let Some(id) = self.ids.get(&phoneme) {
                tokens.push(*id);
                tokens.push(self.pad);
            }
        }
        if tokens.len() == 1 {
            return Err(SynthError::Encoding {
                index: utterance.sequence_index,
                message: format!("no known phonemes in {:?}", utterance.text),
            });
        }
        tokens.push(self.eos);
        Ok(tokens)
    }
}

/// Mock encoder for testing: one token per character.
#[derive(Debug, Clone, Default)]
pub struct MockEncoder {
    failing_texts: Vec<String>,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any utterance whose text contains `needle`.
    pub fn with_failure_on(mut self, needle: &str) -> Self {
        self.failing_texts.push(needle.to_string());
        self
    }
}

impl PhonemeEncoder for MockEncoder {
    fn encode(&self, utterance: &Utterance) -> Result<Vec<i64>> {
        if self
            .failing_texts
            .iter()
            .any(|needle| utterance.text.contains(needle.as_str()))
        {
            return Err(SynthError::Encoding {
                index: utterance.sequence_index,
                message: "mock phonemization failure".to_string(),
            });
        }
        Ok(utterance.text.chars().map(|c| c as i64 + 1).collect())
    }
}
