use crate::defaults;
use crate::error::{Result, SynthError};
use crate::pipeline::assembler::AssemblerConfig;
use crate::pipeline::types::SynthesisParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Fallback synthesis parameters for requests that leave fields unset
    pub synthesis: SynthesisParams,
    pub scheduler: SchedulerConfig,
}

/// Batching, lookahead and worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub lookahead: usize,
    pub max_padded_width: usize,
    /// 0 runs inference on the consuming thread
    pub workers: usize,
    pub max_utterance_chars: Option<usize>,
    /// 0=errors only, 2=scheduling traces
    pub verbosity: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            lookahead: defaults::LOOKAHEAD,
            max_padded_width: defaults::MAX_PADDED_WIDTH,
            workers: defaults::WORKERS,
            max_utterance_chars: None,
            verbosity: 0,
        }
    }
}

impl SchedulerConfig {
    /// Rejects values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("scheduler.batch_size", self.batch_size),
            ("scheduler.lookahead", self.lookahead),
            ("scheduler.max_padded_width", self.max_padded_width),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(SynthError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if self.max_utterance_chars == Some(0) {
            return Err(SynthError::ConfigInvalidValue {
                key: "scheduler.max_utterance_chars".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn assembler(&self) -> AssemblerConfig {
        AssemblerConfig {
            batch_size: self.batch_size,
            max_padded_width: self.max_padded_width,
            pad_token: defaults::PAD_TOKEN,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. A missing file is
    /// `ConfigFileNotFound`; invalid TOML is `ConfigParse`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SynthError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SynthError::from(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SynthError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXBATCH_BATCH_SIZE → scheduler.batch_size
    /// - VOXBATCH_LOOKAHEAD → scheduler.lookahead
    /// - VOXBATCH_WORKERS → scheduler.workers
    /// - VOXBATCH_SPEAKER → synthesis.speaker_id
    ///
    /// Empty values are ignored; unparseable ones are an error.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(batch_size) = env_value("BATCH_SIZE")? {
            self.scheduler.batch_size = batch_size;
        }
        if let Some(lookahead) = env_value("LOOKAHEAD")? {
            self.scheduler.lookahead = lookahead;
        }
        if let Some(workers) = env_value("WORKERS")? {
            self.scheduler.workers = workers;
        }
        if let Some(speaker) = env_value("SPEAKER")? {
            self.synthesis.speaker_id = Some(speaker);
        }
        Ok(self)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxbatch/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("voxbatch").join("config.toml"))
            .ok_or_else(|| SynthError::Other("Could not determine config directory".to_string()))
    }
}

fn env_value<T: FromStr>(suffix: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let key = format!("{}_{}", defaults::ENV_PREFIX, suffix);
    let raw = std::env::var(&key);
    match raw {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| SynthError::ConfigInvalidValue {
                key,
                message: format!("{:?}: {}", value, e),
            }),
        _ => Ok(None),
    }
}
