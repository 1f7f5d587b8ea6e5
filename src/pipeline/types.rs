//! Data types flowing through the synthesis pipeline.

use crate::error::{Result, SynthError};
use serde::{Deserialize, Serialize};

/// Per-utterance synthesis parameters.
///
/// Opaque to the scheduler and passed through to the voice model, except
/// `sentence_silence_seconds`, which the scheduler appends as trailing silence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    pub speaker_id: Option<i64>,
    pub length_scale: Option<f32>,
    pub noise_scale: Option<f32>,
    pub noise_w: Option<f32>,
    pub sentence_silence_seconds: Option<f32>,
}

impl SynthesisParams {
    pub fn with_speaker(mut self, speaker_id: i64) -> Self {
        self.speaker_id = Some(speaker_id);
        self
    }

    pub fn with_length_scale(mut self, length_scale: f32) -> Self {
        self.length_scale = Some(length_scale);
        self
    }

    pub fn with_noise_scale(mut self, noise_scale: f32) -> Self {
        self.noise_scale = Some(noise_scale);
        self
    }

    pub fn with_noise_w(mut self, noise_w: f32) -> Self {
        self.noise_w = Some(noise_w);
        self
    }

    pub fn with_sentence_silence(mut self, seconds: f32) -> Self {
        self.sentence_silence_seconds = Some(seconds);
        self
    }

    /// Fills every unset field from `fallback`. Fields set on `self` win.
    pub fn merged_over(self, fallback: &SynthesisParams) -> Self {
        Self {
            speaker_id: self.speaker_id.or(fallback.speaker_id),
            length_scale: self.length_scale.or(fallback.length_scale),
            noise_scale: self.noise_scale.or(fallback.noise_scale),
            noise_w: self.noise_w.or(fallback.noise_w),
            sentence_silence_seconds: self
                .sentence_silence_seconds
                .or(fallback.sentence_silence_seconds),
        }
    }

    /// Rejects non-finite values, non-positive length scales and negative
    /// noise or silence values.
    pub fn validate(&self) -> Result<()> {
        fn check(field: &str, value: Option<f32>, allow_zero: bool) -> Result<()> {
            let Some(v) = value else {
                return Ok(());
            };
            let in_range = if allow_zero { v >= 0.0 } else { v > 0.0 };
            if !v.is_finite() || !in_range {
                let bound = if allow_zero { "non-negative" } else { "positive" };
                return Err(SynthError::InvalidParams {
                    field: field.to_string(),
                    message: format!("{} must be a finite {} number", v, bound),
                });
            }
            Ok(())
        }

        check("length_scale", self.length_scale, false)?;
        check("noise_scale", self.noise_scale, true)?;
        check("noise_w", self.noise_w, true)?;
        check(
            "sentence_silence_seconds",
            self.sentence_silence_seconds,
            true,
        )?;
        if let Some(sid) = self.speaker_id
            && sid < 0
        {
            return Err(SynthError::InvalidParams {
                field: "speaker_id".to_string(),
                message: format!("{} is negative", sid),
            });
        }
        Ok(())
    }
}

/// One unit of text synthesized independently, typically a sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Dense, zero-based position in splitting order.
    pub sequence_index: u64,
    pub text: String,
    pub params: SynthesisParams,
}

impl Utterance {
    pub fn new(sequence_index: u64, text: impl Into<String>, params: SynthesisParams) -> Self {
        Self {
            sequence_index,
            text: text.into(),
            params,
        }
    }
}

/// An utterance converted to the token IDs the voice model consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedUtterance {
    pub sequence_index: u64,
    pub text: String,
    /// Never empty.
    pub token_ids: Vec<i64>,
    pub params: SynthesisParams,
}

impl EncodedUtterance {
    /// Wraps encoder output, rejecting an empty token sequence.
    pub fn new(utterance: Utterance, token_ids: Vec<i64>) -> Result<Self> {
        if token_ids.is_empty() {
            return Err(SynthError::Encoding {
                index: utterance.sequence_index,
                message: format!("no tokens produced for {:?}", utterance.text),
            });
        }
        Ok(Self {
            sequence_index: utterance.sequence_index,
            text: utterance.text,
            token_ids,
            params: utterance.params,
        })
    }

    /// Unpadded token length.
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// A group of encoded utterances submitted to the voice model together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Monotonically increasing from 0 within one stream.
    pub batch_id: u64,
    pub items: Vec<EncodedUtterance>,
    /// One row per item, each padded to `width()`.
    pub padded_tokens: Vec<Vec<i64>>,
    /// True (unpadded) length of each row.
    pub item_lengths: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Padded width shared by every row.
    pub fn width(&self) -> usize {
        self.padded_tokens.first().map_or(0, Vec::len)
    }

    /// Sequence indices of the items, in batch order.
    pub fn sequence_indices(&self) -> Vec<u64> {
        self.items.iter().map(|item| item.sequence_index).collect()
    }
}

/// Synthesized audio for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub sequence_index: u64,
    /// The utterance text this audio speaks.
    pub text: String,
    /// Mono float samples as produced by the voice model.
    pub samples: Vec<f32>,
    /// Invariant across one stream; inherited from the voice model.
    pub sample_rate: u32,
    /// Wall time of the batch this segment was produced in.
    pub inference_ms: Option<f32>,
}

impl AudioSegment {
    pub fn new(
        sequence_index: u64,
        text: impl Into<String>,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Self {
        Self {
            sequence_index,
            text: text.into(),
            samples,
            sample_rate,
            inference_ms: None,
        }
    }

    pub fn with_inference_ms(mut self, inference_ms: f32) -> Self {
        self.inference_ms = Some(inference_ms);
        self
    }

    /// Appends `seconds` of silence. Non-positive durations are ignored.
    pub fn append_silence(&mut self, seconds: f32) {
        if seconds > 0.0 && seconds.is_finite() {
            let count = (seconds * self.sample_rate as f32).round() as usize;
            self.samples.resize(self.samples.len() + count, 0.0);
        }
    }

    pub fn duration_ms(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 * 1000.0 / self.sample_rate as f32
    }

    /// Inference time divided by audio duration (< 1.0 is faster than real time).
    pub fn real_time_factor(&self) -> Option<f32> {
        let duration = self.duration_ms();
        match self.inference_ms {
            Some(ms) if duration > 0.0 => Some(ms / duration),
            _ => None,
        }
    }

    /// Converts to 16-bit PCM, clamping out-of-range samples.
    pub fn to_pcm_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_builder_and_merge() {
        let request = SynthesisParams::default()
            .with_speaker(3)
            .with_length_scale(1.2);
        let voice = SynthesisParams {
            speaker_id: Some(0),
            length_scale: Some(1.0),
            noise_scale: Some(0.667),
            noise_w: Some(0.8),
            sentence_silence_seconds: None,
        };

        let merged = request.merged_over(&voice);
        assert_eq!(merged.speaker_id, Some(3));
        assert_eq!(merged.length_scale, Some(1.2));
        assert_eq!(merged.noise_scale, Some(0.667));
        assert_eq!(merged.noise_w, Some(0.8));
        assert_eq!(merged.sentence_silence_seconds, None);
    }

    #[test]
    fn test_params_validate_accepts_defaults_and_zero_noise() {
        assert!(SynthesisParams::default().validate().is_ok());
        let params = SynthesisParams::default()
            .with_noise_scale(0.0)
            .with_noise_w(0.0)
            .with_sentence_silence(0.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validate_rejects_out_of_range() {
        let zero_length = SynthesisParams::default().with_length_scale(0.0);
        match zero_length.validate() {
            Err(SynthError::InvalidParams { field, .. }) => assert_eq!(field, "length_scale"),
            other => panic!("Expected InvalidParams, got {:?}", other),
        }

        let negative_noise = SynthesisParams::default().with_noise_w(-0.1);
        assert!(negative_noise.validate().is_err());

        let nan_silence = SynthesisParams::default().with_sentence_silence(f32::NAN);
        assert!(nan_silence.validate().is_err());

        let negative_speaker = SynthesisParams::default().with_speaker(-1);
        assert!(negative_speaker.validate().is_err());
    }

    #[test]
    fn test_encoded_utterance_rejects_empty_tokens() {
        let utterance = Utterance::new(5, "Hmm.", SynthesisParams::default());
        match EncodedUtterance::new(utterance, vec![]) {
            Err(SynthError::Encoding { index, .. }) => assert_eq!(index, 5),
            other => panic!("Expected Encoding error, got {:?}", other),
        }
    }

    #[test]
    fn test_encoded_utterance_carries_index_and_params() {
        let params = SynthesisParams::default().with_speaker(2);
        let utterance = Utterance::new(1, "Two.", params);
        let encoded = EncodedUtterance::new(utterance, vec![1, 2, 3]).unwrap();
        assert_eq!(encoded.sequence_index, 1);
        assert_eq!(encoded.text, "Two.");
        assert_eq!(encoded.len(), 3);
        assert_eq!(encoded.params, params);
    }

    #[test]
    fn test_audio_segment_duration_and_rtf() {
        let segment = AudioSegment::new(0, "One.", vec![0.0; 22050], 22050).with_inference_ms(250.0);
        assert!((segment.duration_ms() - 1000.0).abs() < f32::EPSILON);
        assert_eq!(segment.real_time_factor(), Some(0.25));

        let no_timing = AudioSegment::new(0, "", vec![0.0; 10], 16000);
        assert_eq!(no_timing.real_time_factor(), None);
    }

    #[test]
    fn test_audio_segment_append_silence() {
        let mut segment = AudioSegment::new(0, "One.", vec![0.5; 100], 1000);
        segment.append_silence(0.25);
        assert_eq!(segment.samples.len(), 350);
        assert_eq!(segment.samples[349], 0.0);

        segment.append_silence(-1.0);
        assert_eq!(segment.samples.len(), 350);
    }

    #[test]
    fn test_audio_segment_pcm_clamps() {
        let segment = AudioSegment::new(0, "", vec![0.0, 1.0, -1.0, 2.0], 16000);
        assert_eq!(segment.to_pcm_i16(), vec![0, i16::MAX, -i16::MAX, i16::MAX]);
    }
}
