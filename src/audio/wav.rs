//! WAV encoding for synthesized segments.

use crate::error::{Result, SynthError};
use crate::pipeline::types::AudioSegment;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

/// 16-bit PCM mono at `sample_rate`.
pub fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

impl AudioSegment {
    /// Encodes this segment alone as a complete WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = SegmentWriter::new(&mut cursor, self.sample_rate)?;
        writer.write_segment(self)?;
        writer.finalize()?;
        Ok(cursor.into_inner())
    }
}

/// Appends segments, in the order given, to one WAV stream.
pub struct SegmentWriter<W: Write + Seek> {
    writer: hound::WavWriter<W>,
    sample_rate: u32,
    samples_written: usize,
}

impl SegmentWriter<BufWriter<File>> {
    /// Creates (or truncates) a WAV file at `path`.
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let writer = hound::WavWriter::create(path, wav_spec(sample_rate)).map_err(|e| {
            SynthError::Audio {
                message: format!("Failed to create {}: {}", path.display(), e),
            }
        })?;
        Ok(Self {
            writer,
            sample_rate,
            samples_written: 0,
        })
    }
}

impl<W: Write + Seek> SegmentWriter<W> {
    pub fn new(inner: W, sample_rate: u32) -> Result<Self> {
        let writer = hound::WavWriter::new(inner, wav_spec(sample_rate))?;
        Ok(Self {
            writer,
            sample_rate,
            samples_written: 0,
        })
    }

    /// Appends one segment. Its sample rate must match the file's.
    pub fn write_segment(&mut self, segment: &AudioSegment) -> Result<()> {
        if segment.sample_rate != self.sample_rate {
            return Err(SynthError::Audio {
                message: format!(
                    "segment {} is {} Hz but the file is {} Hz",
                    segment.sequence_index, segment.sample_rate, self.sample_rate
                ),
            });
        }
        for sample in segment.to_pcm_i16() {
            self.writer.write_sample(sample)?;
        }
        self.samples_written += segment.samples.len();
        Ok(())
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    /// Writes the header lengths and flushes.
    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}
