//! Synthesizer: owns the voice handles and starts synthesis streams.

use crate::audio::SegmentWriter;
use crate::config::{Config, SchedulerConfig};
use crate::error::{Result, SynthError};
use crate::pipeline::assembler::AssemblerConfig;
use crate::pipeline::controller::SpeechStream;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::executor::Executor;
use crate::pipeline::types::SynthesisParams;
use crate::text::{UtteranceSplitter, decode_text};
use crate::voice::{PhonemeEncoder, VoiceModel};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Entry point for text-to-speech synthesis.
///
/// Created once per loaded voice; every `synthesize` call returns an
/// independent stream sharing the same model.
pub struct SpeechSynthesizer {
    model: Arc<dyn VoiceModel>,
    encoder: Arc<dyn PhonemeEncoder>,
    scheduler: SchedulerConfig,
    default_params: SynthesisParams,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl std::fmt::Debug for SpeechSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSynthesizer")
            .field("model", &self.model.model_name())
            .field("scheduler", &self.scheduler)
            .field("default_params", &self.default_params)
            .finish()
    }
}

impl SpeechSynthesizer {
    /// Validates the model and scheduler settings.
    ///
    /// # Errors
    /// `VoiceModel` if the model is not ready or reports a zero sample rate,
    /// `ConfigInvalidValue` for unusable scheduler values.
    pub fn new(
        model: Arc<dyn VoiceModel>,
        encoder: Arc<dyn PhonemeEncoder>,
        scheduler: SchedulerConfig,
    ) -> Result<Self> {
        if !model.is_ready() {
            return Err(SynthError::VoiceModel {
                message: format!("voice '{}' is not loaded", model.model_name()),
            });
        }
        if model.sample_rate() == 0 {
            return Err(SynthError::VoiceModel {
                message: format!("voice '{}' reports a sample rate of 0", model.model_name()),
            });
        }
        scheduler.validate()?;

        let error_reporter: Arc<dyn ErrorReporter> =
            Arc::new(LogReporter::new(scheduler.verbosity));
        Ok(Self {
            model,
            encoder,
            scheduler,
            default_params: SynthesisParams::default(),
            error_reporter,
        })
    }

    /// Same as `new`, taking scheduler and fallback parameters from `config`.
    pub fn from_config(
        model: Arc<dyn VoiceModel>,
        encoder: Arc<dyn PhonemeEncoder>,
        config: &Config,
    ) -> Result<Self> {
        config.synthesis.validate()?;
        let synthesizer = Self::new(model, encoder, config.scheduler.clone())?;
        Ok(synthesizer.with_default_params(config.synthesis))
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Parameters applied to any field a request leaves unset, ahead of the
    /// voice's own defaults.
    pub fn with_default_params(mut self, params: SynthesisParams) -> Self {
        self.default_params = params;
        self
    }

    /// Makes the named speaker the fallback for requests that set none.
    ///
    /// # Errors
    /// `InvalidParams` if the voice has no speaker with that name.
    pub fn with_speaker(mut self, name: &str) -> Result<Self> {
        let speaker_id = self.speaker_id(name)?;
        self.default_params.speaker_id = Some(speaker_id);
        Ok(self)
    }

    /// Starts synthesizing `text`.
    ///
    /// Input and parameter errors are returned here, before any work starts.
    /// Everything after that arrives through the stream, one result per
    /// utterance in input order.
    pub fn synthesize(&self, text: &str, params: SynthesisParams) -> Result<SpeechStream> {
        let params = self.resolve_params(params)?;
        let splitter = UtteranceSplitter::new(text, params)?
            .with_max_utterance_chars(self.scheduler.max_utterance_chars);
        self.start(splitter, self.scheduler.assembler())
    }

    /// Like `synthesize`, overriding the configured batch size for this call.
    pub fn synthesize_with_batch_size(
        &self,
        text: &str,
        params: SynthesisParams,
        batch_size: usize,
    ) -> Result<SpeechStream> {
        if batch_size == 0 {
            return Err(SynthError::InvalidParams {
                field: "batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let params = self.resolve_params(params)?;
        let splitter = UtteranceSplitter::new(text, params)?
            .with_max_utterance_chars(self.scheduler.max_utterance_chars);
        let assembler = AssemblerConfig {
            batch_size,
            ..self.scheduler.assembler()
        };
        self.start(splitter, assembler)
    }

    /// Like `synthesize`, for text that has not been checked as UTF-8 yet.
    pub fn synthesize_bytes(&self, bytes: &[u8], params: SynthesisParams) -> Result<SpeechStream> {
        let text = decode_text(bytes)?;
        self.synthesize(text, params)
    }

    /// Synthesizes `text` into a single WAV file at `path`.
    ///
    /// Returns the number of segments written. Stops at the first failed
    /// utterance and returns its error; the file then holds the audio
    /// written so far.
    pub fn synthesize_to_file(
        &self,
        path: &Path,
        text: &str,
        params: SynthesisParams,
    ) -> Result<usize> {
        let stream = self.synthesize(text, params)?;
        let mut writer = SegmentWriter::create(path, self.sample_rate())?;
        let mut written = 0;
        for result in stream {
            let segment = result?;
            writer.write_segment(&segment)?;
            written += 1;
        }
        writer.finalize()?;
        Ok(written)
    }

    pub fn sample_rate(&self) -> u32 {
        self.model.sample_rate()
    }

    pub fn speakers(&self) -> Option<&HashMap<i64, String>> {
        self.model.speakers()
    }

    /// Looks up a speaker id by name in the voice's speaker table.
    pub fn speaker_id(&self, name: &str) -> Result<i64> {
        self.speakers()
            .and_then(|speakers| {
                speakers
                    .iter()
                    .find(|(_, speaker)| speaker.as_str() == name)
                    .map(|(id, _)| *id)
            })
            .ok_or_else(|| SynthError::InvalidParams {
                field: "speaker".to_string(),
                message: format!("voice '{}' has no speaker named {:?}", self.model_name(), name),
            })
    }

    /// Name of the speaker used when a request sets none.
    pub fn speaker(&self) -> Option<&str> {
        let speaker_id = self
            .default_params
            .speaker_id
            .or(self.model.default_params().speaker_id)?;
        self.speakers()?.get(&speaker_id).map(String::as_str)
    }

    pub fn language(&self) -> Option<&str> {
        self.model.language()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    /// Request fields win over synthesizer defaults, which win over the voice's.
    fn resolve_params(&self, params: SynthesisParams) -> Result<SynthesisParams> {
        let resolved = params
            .merged_over(&self.default_params)
            .merged_over(&self.model.default_params());
        resolved.validate()?;
        if let (Some(speaker_id), Some(speakers)) = (resolved.speaker_id, self.speakers())
            && !speakers.contains_key(&speaker_id)
        {
            return Err(SynthError::InvalidParams {
                field: "speaker_id".to_string(),
                message: format!(
                    "voice '{}' has no speaker {}",
                    self.model_name(),
                    speaker_id
                ),
            });
        }
        Ok(resolved)
    }

    fn start(
        &self,
        splitter: UtteranceSplitter,
        assembler: AssemblerConfig,
    ) -> Result<SpeechStream> {
        let executor = Executor::new(
            self.model.clone(),
            self.scheduler.workers,
            self.scheduler.lookahead,
            self.error_reporter.clone(),
        )?;
        Ok(SpeechStream::new(
            splitter,
            self.encoder.clone(),
            executor,
            assembler,
            self.scheduler.lookahead,
            self.error_reporter.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{MockEncoder, MockVoiceModel};

    fn synthesizer(model: MockVoiceModel) -> SpeechSynthesizer {
        SpeechSynthesizer::new(
            Arc::new(model),
            Arc::new(MockEncoder::new()),
            SchedulerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_unloaded_model() {
        let result = SpeechSynthesizer::new(
            Arc::new(MockVoiceModel::new("mock").not_ready()),
            Arc::new(MockEncoder::new()),
            SchedulerConfig::default(),
        );
        assert!(matches!(result, Err(SynthError::VoiceModel { .. })));
    }

    #[test]
    fn test_new_rejects_zero_sample_rate() {
        let result = SpeechSynthesizer::new(
            Arc::new(MockVoiceModel::new("mock").with_sample_rate(0)),
            Arc::new(MockEncoder::new()),
            SchedulerConfig::default(),
        );
        assert!(matches!(result, Err(SynthError::VoiceModel { .. })));
    }

    #[test]
    fn test_new_rejects_invalid_scheduler() {
        let result = SpeechSynthesizer::new(
            Arc::new(MockVoiceModel::new("mock")),
            Arc::new(MockEncoder::new()),
            SchedulerConfig {
                lookahead: 0,
                ..SchedulerConfig::default()
            },
        );
        assert!(matches!(
            result,
            Err(SynthError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_input_errors_surface_before_streaming() {
        let synth = synthesizer(MockVoiceModel::new("mock"));
        assert!(matches!(
            synth.synthesize_bytes(b"Hi \xff there.", SynthesisParams::default()),
            Err(SynthError::Input { .. })
        ));
        assert!(matches!(
            synth.synthesize("Hi.", SynthesisParams::default().with_length_scale(-1.0)),
            Err(SynthError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_params_resolve_request_then_synthesizer_then_voice() {
        let voice = crate::voice::VoiceConfig::from_json(
            r#"{ "audio": { "sample_rate": 22050 }, "num_speakers": 2,
                 "speaker_id_map": { "a": 0, "b": 1 } }"#,
        )
        .unwrap();
        let model = MockVoiceModel::from_config("mock", &voice);

        let synth = synthesizer(model)
            .with_default_params(SynthesisParams::default().with_length_scale(1.5));
        let resolved = synth
            .resolve_params(SynthesisParams::default().with_noise_w(0.1))
            .unwrap();

        assert_eq!(resolved.noise_w, Some(0.1));
        assert_eq!(resolved.length_scale, Some(1.5));
        assert_eq!(resolved.speaker_id, Some(0));
    }

    fn multi_speaker_model() -> MockVoiceModel {
        let voice = crate::voice::VoiceConfig::from_json(
            r#"{ "audio": { "sample_rate": 22050 }, "num_speakers": 3,
                 "speaker_id_map": { "p225": 0, "p226": 1, "p227": 2 } }"#,
        )
        .unwrap();
        MockVoiceModel::from_config("vctk", &voice)
    }

    #[test]
    fn test_speaker_selected_by_name() {
        let synth = synthesizer(multi_speaker_model());
        assert_eq!(synth.speaker(), Some("p225"));
        assert_eq!(synth.speaker_id("p227").unwrap(), 2);

        let synth = synth.with_speaker("p226").unwrap();
        assert_eq!(synth.speaker(), Some("p226"));
        let resolved = synth.resolve_params(SynthesisParams::default()).unwrap();
        assert_eq!(resolved.speaker_id, Some(1));

        // A request's own speaker still wins
        let resolved = synth
            .resolve_params(SynthesisParams::default().with_speaker(2))
            .unwrap();
        assert_eq!(resolved.speaker_id, Some(2));
    }

    #[test]
    fn test_unknown_speakers_are_rejected() {
        let synth = synthesizer(multi_speaker_model());
        assert!(matches!(
            synth.speaker_id("nobody"),
            Err(SynthError::InvalidParams { .. })
        ));
        assert!(matches!(
            synth.synthesize("Hi.", SynthesisParams::default().with_speaker(7)),
            Err(SynthError::InvalidParams { .. })
        ));

        // Single-speaker voices have no table to look names up in
        let single = synthesizer(MockVoiceModel::new("mock"));
        assert!(single.speaker().is_none());
        assert!(single.with_speaker("p225").is_err());
    }

    #[test]
    fn test_batch_size_override_applies_to_one_call() {
        let model = MockVoiceModel::new("mock");
        let synth = synthesizer(model.clone());

        let count = synth
            .synthesize_with_batch_size("A. B. C.", SynthesisParams::default(), 1)
            .unwrap()
            .count();
        assert_eq!(count, 3);
        // Two workers may start batches in either order
        let mut calls = model.calls();
        calls.sort();
        assert_eq!(calls, vec![vec![0], vec![1], vec![2]]);

        assert!(matches!(
            synth.synthesize_with_batch_size("A.", SynthesisParams::default(), 0),
            Err(SynthError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_accessors_delegate_to_model() {
        let synth = synthesizer(MockVoiceModel::new("amy").with_sample_rate(16000));
        assert_eq!(synth.sample_rate(), 16000);
        assert_eq!(synth.model_name(), "amy");
        assert!(synth.speakers().is_none());
        assert!(synth.language().is_none());
    }

    #[test]
    fn test_synthesize_streams_every_sentence() {
        let synth = synthesizer(MockVoiceModel::new("mock"));
        let segments: Vec<_> = synth
            .synthesize("One. Two. Three.", SynthesisParams::default())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["One.", "Two.", "Three."]);
    }
}
