//! Capture session: live chunk delivery into two separate buffers
//!
//! Every chunk the driver delivers goes two places:
//! - the accumulation buffer (an unbounded channel, lossless, drained at stop)
//! - a flattened copy into the `BoundedSampleQueue` for visualization (lossy)
//!
//! Visualization backpressure only ever evicts from the queue, never from the
//! accumulation buffer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use super::chunk::{AudioAsset, AudioFormat, SampleChunk};
use super::input::{InputDevice, InputStream};
use super::queue::BoundedSampleQueue;
use crate::state_machine::{reduce, Action, CaptureState, Rejection};

/// Errors that can occur while starting or stopping capture.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Audio input unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio input is already in use by another recording")]
    DeviceBusy,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,
}

impl From<Rejection> for CaptureError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::AlreadyRecording => CaptureError::AlreadyRecording,
            Rejection::NotRecording => CaptureError::NotRecording,
        }
    }
}

/// Sample-count clock shared between the producer and any reader.
///
/// Duration is derived from delivered frames, never from wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct CaptureClock {
    inner: Arc<ClockInner>,
}

#[derive(Debug, Default)]
struct ClockInner {
    frames: AtomicU64,
    sample_rate: AtomicU32,
}

impl CaptureClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the clock, returning the previous (frames, sample rate).
    fn reset(&self, sample_rate: u32) -> (u64, u32) {
        let frames = self.inner.frames.swap(0, Ordering::AcqRel);
        let rate = self.inner.sample_rate.swap(sample_rate, Ordering::AcqRel);
        (frames, rate)
    }

    fn restore(&self, (frames, sample_rate): (u64, u32)) {
        self.inner.frames.store(frames, Ordering::Release);
        self.inner.sample_rate.store(sample_rate, Ordering::Release);
    }

    fn advance(&self, samples: usize, format: AudioFormat) {
        let frames = samples as u64 / format.channels.max(1) as u64;
        self.inner.sample_rate.store(format.sample_rate, Ordering::Release);
        self.inner.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn frames(&self) -> u64 {
        self.inner.frames.load(Ordering::Acquire)
    }

    /// Accumulated frames / sample rate, in seconds
    pub fn elapsed_secs(&self) -> f64 {
        let rate = self.inner.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / rate as f64
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs())
    }
}

/// Producer-side handle given to an input device for one recording.
///
/// Cheap to clone; safe to call from a real-time callback (no blocking
/// beyond the queue's short critical section).
#[derive(Debug, Clone)]
pub struct ChunkSink {
    chunks: mpsc::UnboundedSender<SampleChunk>,
    queue: Arc<BoundedSampleQueue>,
    clock: CaptureClock,
}

impl ChunkSink {
    /// Deliver one chunk. Returns false once the recording has been stopped.
    pub fn deliver(&self, chunk: SampleChunk) -> bool {
        if chunk.is_empty() {
            return true;
        }

        let mirror = chunk.samples().to_vec();
        let format = chunk.format();
        if self.chunks.send(chunk).is_err() {
            return false;
        }
        self.clock.advance(mirror.len(), format);
        self.queue.push(mirror);
        true
    }

    /// Deliver a chunk that came with a driver status code.
    ///
    /// A non-zero status (overflow, glitch) is logged and the chunk is still kept.
    pub fn deliver_with_status(&self, chunk: SampleChunk, status: u32) -> bool {
        if status != 0 {
            log::warn!(
                "Input driver reported status {:#x} ({} samples), continuing capture",
                status,
                chunk.len()
            );
        }
        self.deliver(chunk)
    }

    /// Log a stream error reported out-of-band by the driver. Capture continues.
    pub fn report_stream_error(&self, err: &dyn std::fmt::Display) {
        log::warn!("Audio stream error (capture continues): {}", err);
    }

    pub fn is_closed(&self) -> bool {
        self.chunks.is_closed()
    }
}

struct ActiveCapture {
    stream: Box<dyn InputStream>,
    chunks_rx: mpsc::UnboundedReceiver<SampleChunk>,
}

/// Owns one input device's capture lifecycle.
pub struct CaptureSession {
    device: Arc<dyn InputDevice>,
    state: CaptureState,
    queue: Arc<BoundedSampleQueue>,
    clock: CaptureClock,
    active: Option<ActiveCapture>,
}

impl CaptureSession {
    pub fn new(device: Arc<dyn InputDevice>, queue_capacity: usize) -> Self {
        Self {
            device,
            state: CaptureState::Idle,
            queue: Arc::new(BoundedSampleQueue::new(queue_capacity)),
            clock: CaptureClock::new(),
            active: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Visualization mirror (shared with the waveform feed)
    pub fn queue(&self) -> Arc<BoundedSampleQueue> {
        self.queue.clone()
    }

    pub fn clock(&self) -> CaptureClock {
        self.clock.clone()
    }

    pub fn current_duration(&self) -> f64 {
        self.clock.elapsed_secs()
    }

    /// Start capturing. Rejected while already recording.
    ///
    /// The queue and clock are reset before the device opens so that early
    /// deliveries count; if the open fails they are put back as they were.
    pub fn start(&mut self, format: AudioFormat) -> Result<(), CaptureError> {
        let next = reduce(self.state, Action::Start)?;

        let previous_queue = self.queue.take_contents();
        let previous_clock = self.clock.reset(format.sample_rate);

        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel();
        let sink = ChunkSink {
            chunks: chunks_tx,
            queue: self.queue.clone(),
            clock: self.clock.clone(),
        };

        let stream = match self.device.open(format, sink) {
            Ok(stream) => stream,
            Err(e) => {
                self.queue.restore_contents(previous_queue);
                self.clock.restore(previous_clock);
                log::warn!("Capture start failed, previous recording kept: {}", e);
                return Err(e);
            }
        };
        let actual = stream.format();
        if actual != format {
            log::info!(
                "Capture format differs from request: {} Hz / {} ch",
                actual.sample_rate,
                actual.channels
            );
        }

        self.active = Some(ActiveCapture { stream, chunks_rx });
        self.state = next;
        log::info!("Capture started ({} Hz, {} ch)", actual.sample_rate, actual.channels);
        Ok(())
    }

    /// Stop capturing and return the recording, or `None` if nothing was delivered.
    ///
    /// The input stream is halted before this returns; late deliveries are refused.
    pub fn stop(&mut self) -> Result<Option<AudioAsset>, CaptureError> {
        let next = reduce(self.state, Action::Stop)?;

        let Some(ActiveCapture {
            stream,
            mut chunks_rx,
        }) = self.active.take()
        else {
            self.state = next;
            return Ok(None);
        };

        let format = stream.format();
        stream.halt();
        // Refuse anything still in flight, then drain what was accepted
        chunks_rx.close();

        let mut chunks = Vec::new();
        while let Ok(chunk) = chunks_rx.try_recv() {
            chunks.push(chunk);
        }

        self.state = next;

        let asset = AudioAsset::from_chunks(chunks, format);
        match &asset {
            Some(asset) => log::info!(
                "Capture stopped: {} samples, {:.2}s (visualization dropped {} chunks)",
                asset.sample_count(),
                asset.duration_secs(),
                self.queue.dropped()
            ),
            None => log::info!("Capture stopped with no audio delivered"),
        }

        Ok(asset)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stream.halt();
        }
    }
}
