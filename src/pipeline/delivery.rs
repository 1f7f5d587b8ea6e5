//! Off-thread delivery of a `SpeechStream`.
//!
//! `BackgroundStream` moves the stream onto a named thread and hands results
//! over a bounded crossbeam channel. `AsyncSpeechStream` does the same from a
//! tokio blocking task for async callers. Both keep the stream's ordering and
//! cancellation guarantees: once cancelled, the next receive reports
//! `Cancelled` even if successful results are already buffered.

use crate::error::{Result, SynthError};
use crate::pipeline::controller::{CancelHandle, SpeechStream};
use crate::pipeline::types::AudioSegment;
use crossbeam_channel::{Receiver, bounded};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

impl SpeechStream {
    /// Runs the stream on a background thread, buffering up to `buffer`
    /// results ahead of the caller.
    pub fn spawn_background(self, buffer: usize) -> Result<BackgroundStream> {
        let cancel = self.cancel_handle();
        let (tx, rx) = bounded(buffer.max(1));

        let handle = thread::Builder::new()
            .name("speech-stream".to_string())
            .spawn(move || {
                for item in self {
                    if tx.send(item).is_err() {
                        // Receiver gone
                        break;
                    }
                }
            })?;

        Ok(BackgroundStream {
            rx,
            cancel,
            handle: Some(handle),
            done: false,
        })
    }

    /// Runs the stream on tokio's blocking pool. Must be called from within
    /// a tokio runtime.
    pub fn into_async(self, buffer: usize) -> Result<AsyncSpeechStream> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SynthError::Other(format!("no tokio runtime: {}", e)))?;
        let cancel = self.cancel_handle();
        let (tx, rx) = mpsc::channel(buffer.max(1));

        runtime.spawn_blocking(move || {
            for item in self {
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        Ok(AsyncSpeechStream {
            rx,
            cancel,
            done: false,
        })
    }
}

/// Results of a stream running on its own thread.
pub struct BackgroundStream {
    rx: Receiver<Result<AudioSegment>>,
    cancel: CancelHandle,
    handle: Option<JoinHandle<()>>,
    done: bool,
}

impl BackgroundStream {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains the remaining results and waits for the producer thread.
    pub fn join(mut self) -> Result<Vec<Result<AudioSegment>>> {
        let rest: Vec<_> = self.by_ref().collect();
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| SynthError::Other("speech stream thread panicked".to_string()))?;
        }
        Ok(rest)
    }
}

impl Iterator for BackgroundStream {
    type Item = Result<AudioSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(SynthError::Cancelled));
        }
        match self.rx.recv() {
            Ok(Err(SynthError::Cancelled)) => {
                self.done = true;
                Some(Err(SynthError::Cancelled))
            }
            Ok(Ok(_)) if self.cancel.is_cancelled() => {
                self.done = true;
                Some(Err(SynthError::Cancelled))
            }
            Ok(item) => Some(item),
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

impl Drop for BackgroundStream {
    fn drop(&mut self) {
        // The producer notices on its next pull or send; detach instead of
        // waiting on in-flight inference.
        self.cancel.cancel();
    }
}

/// Async receiver for a stream running on tokio's blocking pool.
pub struct AsyncSpeechStream {
    rx: mpsc::Receiver<Result<AudioSegment>>,
    cancel: CancelHandle,
    done: bool,
}

impl AsyncSpeechStream {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next result in sequence order, or `None` when the stream has ended.
    pub async fn next(&mut self) -> Option<Result<AudioSegment>> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(SynthError::Cancelled));
        }
        match self.rx.recv().await {
            Some(Err(SynthError::Cancelled)) => {
                self.done = true;
                Some(Err(SynthError::Cancelled))
            }
            Some(Ok(_)) if self.cancel.is_cancelled() => {
                self.done = true;
                Some(Err(SynthError::Cancelled))
            }
            Some(item) => Some(item),
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Collects every remaining result.
    pub async fn collect(mut self) -> Vec<Result<AudioSegment>> {
        let mut results = Vec::new();
        while let Some(item) = self.next().await {
            results.push(item);
        }
        results
    }
}

impl Drop for AsyncSpeechStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
