//! WAV persistence for finished recordings
//!
//! Assets are written as single-channel 16-bit PCM at the capture sample rate
//! (multi-channel captures are down-mixed). Reading converts back to f32.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::chunk::{AudioAsset, AudioFormat};
use super::paths::{cleanup_old_recordings, generate_wav_path};

#[derive(Debug, Error)]
pub enum RecordingStoreError {
    #[error("Failed to create recording file: {0}")]
    FileCreationFailed(String),

    #[error("Failed to write audio data: {0}")]
    WriteFailed(String),

    #[error("Failed to read recording {path:?}: {message}")]
    ReadFailed { path: PathBuf, message: String },
}

/// A recording that has been written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedRecording {
    pub id: Uuid,
    pub path: PathBuf,
    pub duration_secs: f64,
    pub format: AudioFormat,
}

/// Decoded contents of a WAV file.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.format.seconds_for(self.samples.len() as u64)
    }
}

/// Writes assets into a directory and prunes old files.
#[derive(Debug, Clone)]
pub struct RecordingStore {
    dir: PathBuf,
    max_recordings: usize,
}

impl RecordingStore {
    pub fn new(dir: impl Into<PathBuf>, max_recordings: usize) -> Self {
        Self {
            dir: dir.into(),
            max_recordings: max_recordings.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the asset to a new WAV file and return where it went.
    pub fn persist(&self, asset: &AudioAsset) -> Result<PersistedRecording, RecordingStoreError> {
        let path = generate_wav_path(&self.dir, asset.id())
            .map_err(|e| RecordingStoreError::FileCreationFailed(e.to_string()))?;

        let format = AudioFormat::mono(asset.format().sample_rate);
        write_wav(&path, &asset.mono_samples(), format)?;

        log::info!(
            "Recording persisted: {:?} ({:.2}s)",
            path,
            asset.duration_secs()
        );

        match cleanup_old_recordings(&self.dir, self.max_recordings) {
            Ok(count) if count > 0 => log::info!("Cleaned up {} old recordings", count),
            Ok(_) => {}
            Err(e) => log::warn!("Failed to cleanup old recordings: {}", e),
        }

        Ok(PersistedRecording {
            id: asset.id(),
            path,
            duration_secs: asset.duration_secs(),
            format,
        })
    }
}

/// Write samples as 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32], format: AudioFormat) -> Result<(), RecordingStoreError> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16, // Always write as 16-bit
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| RecordingStoreError::FileCreationFailed(e.to_string()))?;

    for &sample in samples {
        writer
            .write_sample(sample_to_i16(sample))
            .map_err(|e| RecordingStoreError::WriteFailed(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| RecordingStoreError::WriteFailed(e.to_string()))
}

/// Read a WAV file (integer or float) into f32 samples.
pub fn read_wav(path: &Path) -> Result<DecodedAudio, RecordingStoreError> {
    let read_err = |e: hound::Error| RecordingStoreError::ReadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let reader = WavReader::open(path).map_err(read_err)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(read_err)?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(read_err)?
        }
    };

    Ok(DecodedAudio {
        samples,
        format: AudioFormat::new(spec.sample_rate, spec.channels),
    })
}

/// Convert an f32 sample to i16 for WAV writing.
fn sample_to_i16(sample: f32) -> i16 {
    // Clamp and convert to i16
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::SampleChunk;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(1.0), i16::MAX);
        assert_eq!(sample_to_i16(-1.0), -i16::MAX);

        // Clamping
        assert_eq!(sample_to_i16(2.0), i16::MAX);
        assert_eq!(sample_to_i16(-2.0), -i16::MAX);
    }

    #[test]
    fn test_persist_writes_mono_pcm16() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path(), 5);

        let format = AudioFormat::mono(44_100);
        let chunks = vec![SampleChunk::new(vec![0.25; 4410], format)];
        let asset = AudioAsset::from_chunks(chunks, format).unwrap();

        let saved = store.persist(&asset).unwrap();
        assert!(saved.path.exists());
        assert_eq!(saved.id, asset.id());
        assert!((saved.duration_secs - 0.1).abs() < 1e-9);

        let reader = WavReader::open(&saved.path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 4410);
    }

    #[test]
    fn test_stereo_asset_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path(), 5);

        let format = AudioFormat::new(8_000, 2);
        let chunks = vec![SampleChunk::new(vec![0.5, 0.5, -0.5, -0.5], format)];
        let asset = AudioAsset::from_chunks(chunks, format).unwrap();

        let saved = store.persist(&asset).unwrap();
        assert_eq!(saved.format, AudioFormat::mono(8_000));

        let decoded = read_wav(&saved.path).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert_eq!(decoded.format.channels, 1);
    }

    #[test]
    fn test_read_back_is_close_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 / 10.0).sin() * 0.8).collect();

        write_wav(&path, &samples, AudioFormat::mono(16_000)).unwrap();
        let decoded = read_wav(&path).unwrap();

        assert_eq!(decoded.samples.len(), samples.len());
        for (a, b) in decoded.samples.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-3);
        }
        assert!((decoded.duration_secs() - 100.0 / 16_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_read_missing_file_errors() {
        let err = read_wav(Path::new("/tmp/this_file_does_not_exist_12345.wav")).unwrap_err();
        assert!(matches!(err, RecordingStoreError::ReadFailed { .. }));
    }
}
