//! Playback of recorded audio through the default output device

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use thiserror::Error;

use super::chunk::AudioFormat;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    Stream(#[from] rodio::StreamError),

    #[error("Playback failed: {0}")]
    Play(#[from] rodio::PlayError),

    #[error("Nothing to play")]
    Empty,
}

/// Something that can play a sample buffer to completion.
pub trait Player: Send + Sync {
    /// Play the samples and block until they have finished.
    fn play_blocking(&self, samples: Vec<f32>, format: AudioFormat) -> Result<(), PlaybackError>;
}

/// rodio-backed player.
///
/// The output stream is opened per call; `rodio::OutputStream` is not `Send`
/// so it can't be kept inside a shared controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioPlayer;

impl RodioPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl Player for RodioPlayer {
    fn play_blocking(&self, samples: Vec<f32>, format: AudioFormat) -> Result<(), PlaybackError> {
        if samples.is_empty() {
            return Err(PlaybackError::Empty);
        }

        let (_stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;

        log::debug!(
            "Playing {} samples at {} Hz / {} ch",
            samples.len(),
            format.sample_rate,
            format.channels
        );

        sink.append(SamplesBuffer::new(format.channels, format.sample_rate, samples));
        sink.play();
        sink.sleep_until_end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_is_rejected_before_opening_output() {
        let err = RodioPlayer::new()
            .play_blocking(Vec::new(), AudioFormat::default())
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Empty));
    }
}
