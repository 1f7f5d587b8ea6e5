//! Error reporting for pipeline stages.
//!
//! Per-utterance errors reach the caller through the stream itself. The
//! reporter sees what the caller cannot: worker panics, discarded results,
//! shutdown problems and (at high verbosity) scheduling traces.

use crate::error::SynthError;
use std::sync::{Mutex, PoisonError};

/// Trait for reporting stage errors and diagnostics.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a stage.
    fn report(&self, stage: &str, error: &SynthError);

    /// Reports a diagnostic line. Ignored by default.
    fn trace(&self, _stage: &str, _message: &str) {}
}

/// Reporter that logs to stderr.
///
/// Errors are always printed; traces only at verbosity 2 or higher.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter {
    verbosity: u8,
}

impl LogReporter {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &SynthError) {
        eprintln!("[{}] {}", stage, error);
    }

    fn trace(&self, stage: &str, message: &str) {
        if self.verbosity >= 2 {
            eprintln!("[{}] {}", stage, message);
        }
    }
}

/// Reporter that keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: Mutex<Vec<(String, String)>>,
    traces: Mutex<Vec<(String, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(stage, message)` for every reported error.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(stage, message)` for every trace line.
    pub fn traces(&self) -> Vec<(String, String)> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: &str, error: &SynthError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((stage.to_string(), error.to_string()));
    }

    fn trace(&self, stage: &str, message: &str) {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((stage.to_string(), message.to_string()));
    }
}
