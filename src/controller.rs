//! Recording controller
//!
//! One controller per user session. It drives a `CaptureSession` through the
//! Idle -> Recording -> Stopped lifecycle, persists finished recordings,
//! plays the latest one back and publishes `RecorderStatus` to whoever is
//! rendering the UI.
//!
//! Start-while-recording and stop-while-idle are warning outcomes, not errors.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::audio::{
    read_wav, run_waveform_emitter, AudioAsset, AudioFormat, CaptureError, CaptureSession,
    FeedConfig, InputDevice, PersistedRecording, PlaybackError, Player, RecordingStore,
    RecordingStoreError, WaveformFeed, WaveformSnapshot, DEFAULT_QUEUE_CAPACITY,
};
use crate::settings::AppSettings;
use crate::state_machine::CaptureState;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] RecordingStoreError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("No recording available to play")]
    NoRecordingAvailable,

    #[error("No unsaved recording to persist")]
    NothingToPersist,
}

/// State pushed to the UI on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: CaptureState,
    pub duration_secs: f64,
    pub last_recording: Option<PersistedRecording>,
}

impl RecorderStatus {
    fn idle() -> Self {
        Self {
            state: CaptureState::Idle,
            duration_secs: 0.0,
            last_recording: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Already recording; nothing changed
    AlreadyRecording,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Saved(PersistedRecording),
    /// Stopped, but no audio was delivered
    NoRecording,
    /// Wasn't recording; nothing changed
    NotRecording,
}

/// Capture parameters for a controller
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub format: AudioFormat,
    pub queue_capacity: usize,
    pub feed: FeedConfig,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            feed: FeedConfig::default(),
        }
    }
}

impl ControllerOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            format: settings.audio_format(),
            queue_capacity: settings.queue_capacity,
            feed: settings.feed_config(),
        }
    }
}

/// Where waveform snapshots go while recording.
struct WaveformSink {
    runtime: Handle,
    tx: mpsc::Sender<WaveformSnapshot>,
    shutdown: CancellationToken,
}

pub struct RecordingController {
    session: CaptureSession,
    store: RecordingStore,
    player: Box<dyn Player>,
    options: ControllerOptions,
    status_tx: watch::Sender<RecorderStatus>,
    waveform: Option<WaveformSink>,
    feed_cancel: Option<CancellationToken>,
    last_recording: Option<PersistedRecording>,
    /// Captured at the last stop but not yet written
    unsaved: Option<AudioAsset>,
}

impl RecordingController {
    pub fn new(
        device: Arc<dyn InputDevice>,
        store: RecordingStore,
        player: Box<dyn Player>,
        options: ControllerOptions,
    ) -> Self {
        let (status_tx, _) = watch::channel(RecorderStatus::idle());
        Self {
            session: CaptureSession::new(device, options.queue_capacity),
            store,
            player,
            options,
            status_tx,
            waveform: None,
            feed_cancel: None,
            last_recording: None,
            unsaved: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    pub fn is_recording(&self) -> bool {
        self.session.state().is_recording()
    }

    /// Seconds captured so far in the current (or last) recording.
    pub fn current_duration(&self) -> f64 {
        self.session.current_duration()
    }

    pub fn last_recording(&self) -> Option<&PersistedRecording> {
        self.last_recording.as_ref()
    }

    /// The last recording, if writing it to disk failed.
    pub fn unsaved_recording(&self) -> Option<&AudioAsset> {
        self.unsaved.as_ref()
    }

    /// Receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status_tx.subscribe()
    }

    /// A feed over this controller's visualization queue.
    pub fn waveform_feed(&self) -> WaveformFeed {
        WaveformFeed::new(self.session.queue(), self.session.clock(), self.options.feed)
    }

    /// Stream snapshots into `tx` for every recording from now on.
    ///
    /// Each recording gets its own emitter task on `runtime`, cancelled at stop.
    /// Returns a token that shuts down all future emitters when cancelled.
    pub fn attach_waveform_sink(
        &mut self,
        runtime: Handle,
        tx: mpsc::Sender<WaveformSnapshot>,
    ) -> CancellationToken {
        let shutdown = CancellationToken::new();
        if let Some(previous) = self.waveform.replace(WaveformSink {
            runtime,
            tx,
            shutdown: shutdown.clone(),
        }) {
            previous.shutdown.cancel();
        }
        if self.is_recording() {
            self.start_feed();
        }
        shutdown
    }

    pub fn start_recording(&mut self) -> Result<StartOutcome, ControllerError> {
        if self.is_recording() {
            log::warn!("Start ignored: already recording");
            return Ok(StartOutcome::AlreadyRecording);
        }

        match self.session.start(self.options.format) {
            Ok(()) => {}
            Err(CaptureError::AlreadyRecording) => {
                log::warn!("Start ignored: already recording");
                return Ok(StartOutcome::AlreadyRecording);
            }
            Err(e) => {
                log::error!("Failed to start recording: {}", e);
                return Err(e.into());
            }
        }

        // Previous asset is released; its file stays until pruned
        self.last_recording = None;
        if let Some(asset) = self.unsaved.take() {
            log::warn!("Discarding unsaved recording {}", asset.id());
        }
        self.start_feed();
        self.publish();
        Ok(StartOutcome::Started)
    }

    pub fn stop_recording(&mut self) -> Result<StopOutcome, ControllerError> {
        let asset = match self.session.stop() {
            Ok(asset) => asset,
            Err(CaptureError::NotRecording) => {
                log::warn!("Stop ignored: not recording");
                return Ok(StopOutcome::NotRecording);
            }
            Err(e) => return Err(e.into()),
        };

        self.stop_feed();

        let Some(asset) = asset else {
            log::info!("No recording made");
            self.publish();
            return Ok(StopOutcome::NoRecording);
        };

        self.unsaved = Some(asset);
        let persisted = self.persist_unsaved();
        self.publish();

        Ok(StopOutcome::Saved(persisted?))
    }

    /// Try again to write a recording whose save failed at stop.
    pub fn retry_persist(&mut self) -> Result<PersistedRecording, ControllerError> {
        let persisted = self.persist_unsaved();
        self.publish();
        persisted
    }

    /// Persist `unsaved`; it stays in memory if the write fails.
    fn persist_unsaved(&mut self) -> Result<PersistedRecording, ControllerError> {
        let Some(asset) = &self.unsaved else {
            return Err(ControllerError::NothingToPersist);
        };
        match self.store.persist(asset) {
            Ok(recording) => {
                self.unsaved = None;
                self.last_recording = Some(recording.clone());
                Ok(recording)
            }
            Err(e) => {
                log::error!(
                    "Failed to save recording {} ({:.2}s), kept in memory: {}",
                    asset.id(),
                    asset.duration_secs(),
                    e
                );
                Err(e.into())
            }
        }
    }

    /// Decode the latest recording and play it. Blocks until playback ends.
    ///
    /// A recording that couldn't be saved is played from memory.
    pub fn play_recording(&self) -> Result<(), ControllerError> {
        if let Some(asset) = &self.unsaved {
            log::info!(
                "Playing unsaved recording {} ({:.2}s)",
                asset.id(),
                asset.duration_secs()
            );
            let format = AudioFormat::mono(asset.format().sample_rate);
            self.player.play_blocking(asset.mono_samples(), format)?;
            return Ok(());
        }

        let recording = self
            .last_recording
            .as_ref()
            .ok_or(ControllerError::NoRecordingAvailable)?;

        let decoded = read_wav(&recording.path)?;
        log::info!(
            "Playing recording {} ({:.2}s)",
            recording.id,
            decoded.duration_secs()
        );
        self.player.play_blocking(decoded.samples, decoded.format)?;
        Ok(())
    }

    fn start_feed(&mut self) {
        self.stop_feed();
        let Some(sink) = &self.waveform else {
            return;
        };

        let cancel = sink.shutdown.child_token();
        sink.runtime.spawn(run_waveform_emitter(
            self.waveform_feed(),
            sink.tx.clone(),
            cancel.clone(),
        ));
        self.feed_cancel = Some(cancel);
    }

    fn stop_feed(&mut self) {
        if let Some(cancel) = self.feed_cancel.take() {
            cancel.cancel();
        }
    }

    fn publish(&self) {
        let status = RecorderStatus {
            state: self.session.state(),
            duration_secs: self.session.current_duration(),
            last_recording: self.last_recording.clone(),
        };
        // No receivers is fine; the value is kept for later subscribers
        self.status_tx.send_replace(status);
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.stop_feed();
    }
}
