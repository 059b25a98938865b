//! Audio capture, buffering, persistence and playback
//!
//! Uses CPAL for capture, hound for WAV encoding and rodio for playback.

mod capture;
mod chunk;
mod input;
mod paths;
mod playback;
mod queue;
mod waveform;
mod wav;

pub use capture::{CaptureClock, CaptureError, CaptureSession, ChunkSink};
pub use chunk::{AudioAsset, AudioFormat, SampleChunk, DEFAULT_SAMPLE_RATE};
pub use input::{ClaimGuard, CpalInput, DeviceClaim, InputDevice, InputStream, PushInput};
pub use paths::{cleanup_old_recordings, create_recordings_dir, default_recordings_dir, generate_wav_path};
pub use playback::{PlaybackError, Player, RodioPlayer};
pub use queue::{BoundedSampleQueue, DEFAULT_QUEUE_CAPACITY};
pub use waveform::{
    run_waveform_emitter, FeedConfig, LevelSmoother, WaveformFeed, WaveformSnapshot,
    DEFAULT_TICK_MS, DEFAULT_WINDOW_SAMPLES,
};
pub use wav::{read_wav, write_wav, DecodedAudio, PersistedRecording, RecordingStore, RecordingStoreError};
