//! Sample chunks and finished recordings
//!
//! A `SampleChunk` is one driver callback's worth of samples. An `AudioAsset`
//! is the concatenation of every chunk delivered during one recording.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default capture rate (CD quality, what the practice recordings are stored at)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Sample rate and channel layout of a stream of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1)
    }

    /// Convert an interleaved sample count into seconds.
    ///
    /// Returns 0.0 for a degenerate format rather than dividing by zero.
    pub fn seconds_for(&self, samples: u64) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = samples / self.channels as u64;
        frames as f64 / self.sample_rate as f64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono(DEFAULT_SAMPLE_RATE)
    }
}

/// One delivery of interleaved f32 samples from the capture driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleChunk {
    samples: Vec<f32>,
    format: AudioFormat,
}

impl SampleChunk {
    pub fn new(samples: Vec<f32>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// A finished recording: every accumulated chunk, concatenated in delivery order.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    id: Uuid,
    samples: Vec<f32>,
    format: AudioFormat,
    created_at: DateTime<Utc>,
}

impl AudioAsset {
    /// Concatenate chunks into an asset. Returns `None` when there is nothing to keep.
    pub fn from_chunks(chunks: Vec<SampleChunk>, format: AudioFormat) -> Option<Self> {
        if chunks.is_empty() {
            return None;
        }

        let total: usize = chunks.iter().map(SampleChunk::len).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks {
            samples.extend(chunk.into_samples());
        }

        Some(Self {
            id: Uuid::new_v4(),
            samples,
            format,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Duration derived from the sample count (never from wall-clock time).
    pub fn duration_secs(&self) -> f64 {
        self.format.seconds_for(self.samples.len() as u64)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Down-mix interleaved samples to a single channel by averaging each frame.
    pub fn mono_samples(&self) -> Vec<f32> {
        let channels = self.format.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}
