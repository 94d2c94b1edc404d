use crate::error::Result;

use super::{resample, SOURCE_SAMPLE_RATE, TARGET_SAMPLE_RATE};

/// Raw PCM chunk received from the client (s16le, mono)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw audio bytes, two per sample
    pub pcm: Vec<u8>,
    /// Sample rate the bytes were recorded at
    pub source_rate: u32,
    /// Sample rate the upstream expects
    pub target_rate: u32,
}

impl AudioFrame {
    /// Frame tagged with the fixed client/upstream wire rates
    pub fn from_client(pcm: Vec<u8>) -> Self {
        Self {
            pcm,
            source_rate: SOURCE_SAMPLE_RATE,
            target_rate: TARGET_SAMPLE_RATE,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }

    pub fn duration_ms(&self) -> f64 {
        self.sample_count() as f64 * 1000.0 / self.source_rate as f64
    }

    /// Convert to the target rate, returning upstream-ready PCM bytes
    pub fn resampled(&self) -> Result<Vec<u8>> {
        resample(&self.pcm, self.source_rate, self.target_rate)
    }
}
