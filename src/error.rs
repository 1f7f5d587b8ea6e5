//! Error types for voxbatch.
//!
//! Every variant carries owned strings so the enum stays `Clone`: a failed
//! batch is reported once per affected sequence index.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthError {
    // Per-call input errors
    #[error("Invalid input text: {message}")]
    Input { message: String },

    #[error("Invalid synthesis parameter {field}: {message}")]
    InvalidParams { field: String, message: String },

    // Per-utterance errors
    #[error("Encoding failed for utterance {index}: {message}")]
    Encoding { index: u64, message: String },

    #[error("Inference failed for utterance {index} (batch {batch_id}): {message}")]
    Inference {
        batch_id: u64,
        index: u64,
        message: String,
    },

    #[error("Synthesis cancelled")]
    Cancelled,

    // Construction errors
    #[error("Voice model error: {message}")]
    VoiceModel { message: String },

    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Output errors
    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SynthError {
    /// Sequence index this error is attached to, if it is a per-utterance error.
    pub fn sequence_index(&self) -> Option<u64> {
        match self {
            SynthError::Encoding { index, .. } | SynthError::Inference { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for SynthError {
    fn from(err: std::io::Error) -> Self {
        SynthError::Io {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SynthError {
    fn from(err: toml::de::Error) -> Self {
        SynthError::ConfigParse {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SynthError {
    fn from(err: serde_json::Error) -> Self {
        SynthError::VoiceModel {
            message: format!("invalid voice description: {}", err),
        }
    }
}

impl From<hound::Error> for SynthError {
    fn from(err: hound::Error) -> Self {
        SynthError::Audio {
            message: err.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SynthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_input_display() {
        let error = SynthError::Input {
            message: "invalid UTF-8 at byte 3".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid input text: invalid UTF-8 at byte 3"
        );
    }

    #[test]
    fn test_encoding_display() {
        let error = SynthError::Encoding {
            index: 4,
            message: "unknown phoneme".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Encoding failed for utterance 4: unknown phoneme"
        );
    }

    #[test]
    fn test_inference_display() {
        let error = SynthError::Inference {
            batch_id: 2,
            index: 7,
            message: "out of memory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Inference failed for utterance 7 (batch 2): out of memory"
        );
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(SynthError::Cancelled.to_string(), "Synthesis cancelled");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = SynthError::ConfigInvalidValue {
            key: "scheduler.batch_size".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for scheduler.batch_size: must be at least 1"
        );
    }

    #[test]
    fn test_sequence_index_only_for_per_utterance_errors() {
        let encoding = SynthError::Encoding {
            index: 3,
            message: String::new(),
        };
        let inference = SynthError::Inference {
            batch_id: 0,
            index: 9,
            message: String::new(),
        };
        assert_eq!(encoding.sequence_index(), Some(3));
        assert_eq!(inference.sequence_index(), Some(9));
        assert_eq!(SynthError::Cancelled.sequence_index(), None);
        assert_eq!(
            SynthError::Input {
                message: String::new()
            }
            .sequence_index(),
            None
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: SynthError = io_error.into();
        assert!(matches!(error, SynthError::Io { .. }));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: SynthError = toml_error.into();
        assert!(error.to_string().contains("Failed to parse configuration"));
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let error: SynthError = json_error.into();
        assert!(matches!(error, SynthError::VoiceModel { .. }));
    }

    #[test]
    fn test_error_is_clone_send_and_sync() {
        fn assert_traits<T: Clone + Send + Sync>() {}
        assert_traits::<SynthError>();

        let error = SynthError::Inference {
            batch_id: 1,
            index: 2,
            message: "boom".to_string(),
        };
        assert_eq!(error.clone(), error);
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_error() -> Result<i32> {
            Err(SynthError::Other("test error".to_string()))
        }
        assert_eq!(returns_error().unwrap_err().to_string(), "test error");
    }
}
