//! Audio input devices
//!
//! `InputDevice` is the seam between a `CaptureSession` and whatever produces
//! samples. `CpalInput` captures from a hardware device on a dedicated audio
//! thread; `PushInput` is fed by an external producer (a web front end
//! forwarding microphone frames, or a test).
//!
//! Both hold a `DeviceClaim`, so a second session trying to open a device that
//! is already capturing fails with `DeviceBusy` instead of stealing it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::capture::{CaptureError, ChunkSink};
use super::chunk::{AudioFormat, SampleChunk};

/// Something a capture session can open to start receiving sample chunks.
pub trait InputDevice: Send + Sync {
    /// Open the device and start delivering chunks into `sink`.
    ///
    /// `requested` is a preference; the returned stream reports the format it
    /// actually delivers.
    fn open(
        &self,
        requested: AudioFormat,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputStream>, CaptureError>;
}

/// A running input stream.
pub trait InputStream: Send {
    /// Format of the chunks this stream delivers
    fn format(&self) -> AudioFormat;

    /// Stop the stream. When this returns no further callbacks will run.
    fn halt(self: Box<Self>);
}

/// Exclusive-use marker shared by every clone of one device handle.
#[derive(Debug, Clone, Default)]
pub struct DeviceClaim {
    in_use: Arc<AtomicBool>,
}

impl DeviceClaim {
    pub fn acquire(&self) -> Result<ClaimGuard, CaptureError> {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::DeviceBusy)?;
        Ok(ClaimGuard {
            in_use: self.in_use.clone(),
        })
    }

    pub fn is_claimed(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Releases the device claim when dropped.
#[derive(Debug)]
pub struct ClaimGuard {
    in_use: Arc<AtomicBool>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
    }
}

// ============================================================================
// CPAL hardware input
// ============================================================================

/// Captures from a CPAL input device (the host default unless a name is given).
///
/// Exclusive use is tracked per handle: clones share one claim, so a second
/// session opening a clone gets `DeviceBusy`. Two handles built separately
/// for the same device don't see each other's claim; give every session that
/// may use a device a clone of the same `CpalInput` (or one shared `Arc`).
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    device_name: Option<String>,
    claim: DeviceClaim,
}

impl CpalInput {
    pub fn default_device() -> Self {
        Self::default()
    }

    pub fn named(device_name: impl Into<String>) -> Self {
        Self {
            device_name: Some(device_name.into()),
            claim: DeviceClaim::default(),
        }
    }

    /// Whether the host currently exposes a default input device.
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Names of every input device the default host can see.
    pub fn device_names() -> Result<Vec<String>, CaptureError> {
        let devices = cpal::default_host()
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl InputDevice for CpalInput {
    fn open(
        &self,
        requested: AudioFormat,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        let claim = self.claim.acquire()?;

        // cpal::Stream is not Send on every platform, so it lives and dies on
        // its own thread; we only keep a channel to tell it to stop.
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<AudioFormat, CaptureError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let (stream, format) =
                    match build_input_stream(device_name.as_deref(), requested, sink) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }

                let _ = ready_tx.send(Ok(format));

                // Park until halted (or the handle is dropped)
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("Audio capture thread exiting");
            })
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(format)) => Ok(Box::new(CpalStream {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
                format,
                _claim: claim,
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::DeviceUnavailable(
                    "Audio thread exited during setup".to_string(),
                ))
            }
        }
    }
}

struct CpalStream {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    format: AudioFormat,
    _claim: ClaimGuard,
}

impl CpalStream {
    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio capture thread panicked");
            }
        }
    }
}

impl InputStream for CpalStream {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn halt(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_input_stream(
    device_name: Option<&str>,
    requested: AudioFormat,
    sink: ChunkSink,
) -> Result<(Stream, AudioFormat), CaptureError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("Input device '{}' not found", name))
            })?,
        None => host.default_input_device().ok_or_else(|| {
            CaptureError::DeviceUnavailable("No audio input device found".to_string())
        })?,
    };

    log::info!("Using audio input device: {:?}", device.name());

    let (config, sample_format) = select_config(&device, requested)?;
    let format = AudioFormat::new(config.sample_rate.0, config.channels);

    log::info!(
        "Audio config: {} Hz, {} channels, {:?}",
        format.sample_rate,
        format.channels,
        sample_format
    );

    let err_sink = sink.clone();
    let err_fn = move |err: cpal::StreamError| err_sink.report_stream_error(&err);

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &config, format, sink, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &config, format, sink, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &config, format, sink, err_fn),
        other => Err(CaptureError::DeviceUnavailable(format!(
            "Unsupported sample format {:?}",
            other
        ))),
    }?;

    Ok((stream, format))
}

fn is_handled(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32
    )
}

/// Pick a device config matching the requested rate/channels, falling back to
/// the device default when nothing matches.
fn select_config(
    device: &Device,
    requested: AudioFormat,
) -> Result<(StreamConfig, SampleFormat), CaptureError> {
    let rate = cpal::SampleRate(requested.sample_rate);

    let matching = device
        .supported_input_configs()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
        .filter(|range| {
            range.channels() == requested.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
                && is_handled(range.sample_format())
        })
        .max_by_key(|range| range.sample_format() == SampleFormat::F32);

    if let Some(range) = matching {
        let supported = range.with_sample_rate(rate);
        return Ok((supported.config(), supported.sample_format()));
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    log::warn!(
        "Requested {} Hz / {} ch not supported, using device default {} Hz / {} ch",
        requested.sample_rate,
        requested.channels,
        fallback.sample_rate().0,
        fallback.channels()
    );

    Ok((fallback.config(), fallback.sample_format()))
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    format: AudioFormat,
    sink: ChunkSink,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                sink.deliver(SampleChunk::new(samples, format));
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))
}

// ============================================================================
// Push-fed input
// ============================================================================

/// Input driven by an external producer calling `push`.
///
/// Chunks pushed while no session has the input open are rejected.
#[derive(Debug, Clone)]
pub struct PushInput {
    claim: DeviceClaim,
    current: Arc<Mutex<Option<(ChunkSink, AudioFormat)>>>,
    available: bool,
}

impl PushInput {
    pub fn new() -> Self {
        Self {
            claim: DeviceClaim::default(),
            current: Arc::new(Mutex::new(None)),
            available: true,
        }
    }

    /// An input whose `open` always fails, like a machine without a microphone.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Deliver one chunk. Returns false when nothing is capturing.
    pub fn push(&self, samples: Vec<f32>) -> bool {
        self.push_with_status(samples, 0)
    }

    /// Deliver one chunk along with a driver status code (0 = clean).
    pub fn push_with_status(&self, samples: Vec<f32>, status: u32) -> bool {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some((sink, format)) => {
                sink.deliver_with_status(SampleChunk::new(samples, *format), status)
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for PushInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDevice for PushInput {
    fn open(
        &self,
        requested: AudioFormat,
        sink: ChunkSink,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable(
                "No audio input device found".to_string(),
            ));
        }

        let claim = self.claim.acquire()?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some((sink, requested));

        Ok(Box::new(PushStream {
            current: self.current.clone(),
            format: requested,
            _claim: claim,
        }))
    }
}

struct PushStream {
    current: Arc<Mutex<Option<(ChunkSink, AudioFormat)>>>,
    format: AudioFormat,
    _claim: ClaimGuard,
}

impl InputStream for PushStream {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn halt(self: Box<Self>) {
        // Taking the sink under the same lock `push` uses means no push can be
        // mid-delivery once this returns.
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let claim = DeviceClaim::default();
        let guard = claim.acquire().unwrap();
        assert!(claim.is_claimed());
        assert!(matches!(claim.acquire(), Err(CaptureError::DeviceBusy)));

        drop(guard);
        assert!(!claim.is_claimed());
        assert!(claim.acquire().is_ok());
    }

    #[test]
    fn test_claim_shared_between_clones() {
        let input = PushInput::new();
        let other = input.clone();
        let _guard = input.claim.acquire().unwrap();
        assert!(other.claim.is_claimed());
    }

    #[test]
    fn test_cpal_clones_share_claim() {
        let input = CpalInput::named("USB Microphone");
        let other = input.clone();
        let _guard = input.claim.acquire().unwrap();
        assert!(matches!(other.claim.acquire(), Err(CaptureError::DeviceBusy)));
        assert!(!CpalInput::named("USB Microphone").claim.is_claimed());
    }

    #[test]
    fn test_push_without_open_is_rejected() {
        let input = PushInput::new();
        assert!(!input.is_open());
        assert!(!input.push(vec![0.0; 16]));
    }

    #[test]
    fn test_handled_formats() {
        assert!(is_handled(SampleFormat::F32));
        assert!(is_handled(SampleFormat::I16));
        assert!(!is_handled(SampleFormat::I8));
    }
}
