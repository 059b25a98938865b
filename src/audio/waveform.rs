//! Waveform visualization feed
//!
//! The feed drains the capture session's `BoundedSampleQueue` once per tick
//! and turns whatever was queued into a `WaveformSnapshot`. Ticks that find
//! the queue empty emit nothing. The feed never touches the accumulation
//! buffer, so a slow consumer can only lose visualization frames.
//!
//! The snapshot sequence is a lazy `Stream`: nothing runs until it is polled,
//! it ends only when its `CancellationToken` fires, and a fresh one can be
//! created from the same feed at any time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::capture::CaptureClock;
use super::queue::BoundedSampleQueue;

/// Default emission cadence
pub const DEFAULT_TICK_MS: u64 = 100;

/// Default snapshot window (one second at 44.1 kHz mono)
pub const DEFAULT_WINDOW_SAMPLES: usize = 44_100;

/// EMA smoothing factor (0.3 = 30% new value, 70% previous)
const EMA_ALPHA: f32 = 0.3;

/// A window of recent samples plus the recording duration when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformSnapshot {
    pub samples: Vec<f32>,
    pub elapsed_secs: f64,
    pub captured_at: DateTime<Utc>,
}

impl WaveformSnapshot {
    /// Compute `bars` normalized RMS values (0.0-1.0)
    ///
    /// Divides the window into equal segments and computes RMS for each.
    /// Bars past the end of a short window stay at zero.
    pub fn levels(&self, bars: usize) -> Vec<f32> {
        let mut levels = vec![0.0f32; bars];
        if self.samples.is_empty() || bars == 0 {
            return levels;
        }

        let samples_per_bar = (self.samples.len() / bars).max(1);

        for (bar_idx, level) in levels.iter_mut().enumerate() {
            let start = bar_idx * samples_per_bar;
            if start >= self.samples.len() {
                break;
            }
            let end = ((bar_idx + 1) * samples_per_bar).min(self.samples.len());

            let segment = &self.samples[start..end];
            let sum_squares: f64 = segment.iter().map(|&s| (s as f64) * (s as f64)).sum();
            let rms = (sum_squares / segment.len() as f64).sqrt();
            *level = (rms as f32).clamp(0.0, 1.0);
        }

        levels
    }

    /// Peak absolute amplitude in the window
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
            .min(1.0)
    }
}

/// EMA smoothing for meter levels so bars don't jitter between snapshots.
///
/// smoothed[i] = alpha * current[i] + (1 - alpha) * previous[i]
#[derive(Debug, Default)]
pub struct LevelSmoother {
    prev: Vec<f32>,
}

impl LevelSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply smoothing in place. A change in bar count restarts smoothing.
    pub fn apply(&mut self, levels: &mut [f32]) {
        if self.prev.len() != levels.len() {
            // First frame: use raw values as initial state
            self.prev = levels.to_vec();
            return;
        }

        for (level, prev) in levels.iter_mut().zip(self.prev.iter()) {
            *level = EMA_ALPHA * *level + (1.0 - EMA_ALPHA) * prev;
        }
        self.prev.copy_from_slice(levels);
    }

    pub fn reset(&mut self) {
        self.prev.clear();
    }
}

/// Feed cadence and window size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    pub tick: Duration,
    pub window_samples: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            window_samples: DEFAULT_WINDOW_SAMPLES,
        }
    }
}

/// Consumer side of the visualization queue.
#[derive(Debug, Clone)]
pub struct WaveformFeed {
    queue: Arc<BoundedSampleQueue>,
    clock: CaptureClock,
    config: FeedConfig,
}

struct FeedState {
    feed: WaveformFeed,
    cancel: CancellationToken,
    tick: Option<Interval>,
    last_elapsed: f64,
}

impl WaveformFeed {
    pub fn new(queue: Arc<BoundedSampleQueue>, clock: CaptureClock, config: FeedConfig) -> Self {
        let config = FeedConfig {
            tick: config.tick.max(Duration::from_millis(1)),
            window_samples: config.window_samples.max(1),
        };
        Self {
            queue,
            clock,
            config,
        }
    }

    pub fn config(&self) -> FeedConfig {
        self.config
    }

    /// Drain the queue into one snapshot. `None` when nothing was queued.
    ///
    /// `last_elapsed` keeps durations non-decreasing across calls.
    fn take_snapshot(&self, last_elapsed: &mut f64) -> Option<WaveformSnapshot> {
        if self.queue.is_empty() {
            return None;
        }

        let drained = self.queue.drain_all();
        if drained.is_empty() {
            return None;
        }

        let total: usize = drained.iter().map(Vec::len).sum();
        let mut skip = total.saturating_sub(self.config.window_samples);
        let mut samples = Vec::with_capacity(total - skip);
        for chunk in &drained {
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            samples.extend_from_slice(&chunk[skip..]);
            skip = 0;
        }

        let elapsed_secs = self.clock.elapsed_secs().max(*last_elapsed);
        *last_elapsed = elapsed_secs;

        Some(WaveformSnapshot {
            samples,
            elapsed_secs,
            captured_at: Utc::now(),
        })
    }

    /// Lazy snapshot sequence that runs until `cancel` fires.
    ///
    /// The tick timer is created on first poll, so the stream must be polled
    /// inside a tokio runtime.
    pub fn snapshots(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = WaveformSnapshot> + Send + 'static {
        let state = FeedState {
            feed: self.clone(),
            cancel,
            tick: None,
            last_elapsed: 0.0,
        };

        stream::unfold(state, |mut state| async move {
            if state.tick.is_none() {
                let mut tick = interval(state.feed.config.tick);
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                state.tick = Some(tick);
            }

            loop {
                let tick = state.tick.as_mut()?;
                tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => {
                        log::debug!("Waveform feed cancelled");
                        return None;
                    }
                    _ = tick.tick() => {}
                }

                if let Some(snapshot) = state.feed.take_snapshot(&mut state.last_elapsed) {
                    return Some((snapshot, state));
                }
            }
        })
    }
}

/// Forward a feed into a channel until cancelled or the receiver goes away.
///
/// Snapshots are offered with `try_send`; when the receiver is behind, the
/// snapshot is dropped rather than slowing the feed.
pub async fn run_waveform_emitter(
    feed: WaveformFeed,
    tx: mpsc::Sender<WaveformSnapshot>,
    cancel: CancellationToken,
) {
    log::debug!("Waveform emitter started");

    let snapshots = feed.snapshots(cancel);
    futures_util::pin_mut!(snapshots);

    while let Some(snapshot) = snapshots.next().await {
        match tx.try_send(snapshot) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::debug!("Waveform receiver behind, snapshot skipped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Waveform receiver closed");
                break;
            }
        }
    }

    log::debug!("Waveform emitter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(samples: Vec<f32>) -> WaveformSnapshot {
        WaveformSnapshot {
            samples,
            elapsed_secs: 0.0,
            captured_at: Utc::now(),
        }
    }

    fn feed(window: usize) -> (Arc<BoundedSampleQueue>, WaveformFeed) {
        let queue = Arc::new(BoundedSampleQueue::new(16));
        let feed = WaveformFeed::new(
            queue.clone(),
            CaptureClock::new(),
            FeedConfig {
                tick: Duration::from_millis(5),
                window_samples: window,
            },
        );
        (queue, feed)
    }

    #[test]
    fn test_levels_normalization() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 100.0).sin() * 0.5).collect();
        let levels = snapshot(samples).levels(24);

        assert_eq!(levels.len(), 24);
        for &level in &levels {
            assert!((0.0..=1.0).contains(&level), "level {} out of range", level);
        }
        assert!(levels.iter().any(|&l| l > 0.0));
    }

    #[test]
    fn test_levels_max_amplitude() {
        let levels = snapshot(vec![1.0; 1000]).levels(10);
        for &level in &levels {
            assert!(level >= 0.99, "Expected level near 1.0, got {}", level);
        }
    }

    #[test]
    fn test_levels_empty_window_is_silent() {
        assert_eq!(snapshot(Vec::new()).levels(4), vec![0.0; 4]);
        assert!(snapshot(vec![0.5]).levels(0).is_empty());
    }

    #[test]
    fn test_levels_short_window() {
        let levels = snapshot(vec![1.0, 1.0]).levels(4);
        assert_eq!(levels, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_peak() {
        assert_eq!(snapshot(vec![0.1, -0.7, 0.3]).peak(), 0.7);
        assert_eq!(snapshot(vec![3.0]).peak(), 1.0);
    }

    #[test]
    fn test_smoothing() {
        let mut smoother = LevelSmoother::new();

        let mut first = [0.5f32; 4];
        smoother.apply(&mut first);
        assert_eq!(first[0], 0.5, "First frame should be unchanged");

        let mut second = [1.0f32; 4];
        smoother.apply(&mut second);
        let expected = EMA_ALPHA * 1.0 + (1.0 - EMA_ALPHA) * 0.5;
        assert!((second[0] - expected).abs() < 0.001);

        smoother.reset();
        let mut third = [0.2f32; 4];
        smoother.apply(&mut third);
        assert_eq!(third[0], 0.2, "After reset, first frame should be unchanged");
    }

    #[test]
    fn test_take_snapshot_trims_to_window() {
        let (queue, feed) = feed(5);
        queue.push(vec![1.0, 2.0, 3.0]);
        queue.push(vec![4.0, 5.0, 6.0, 7.0]);

        let mut last = 0.0;
        let snap = feed.take_snapshot(&mut last).unwrap();
        assert_eq!(snap.samples, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_snapshot_empty_queue() {
        let (_queue, feed) = feed(5);
        let mut last = 0.0;
        assert!(feed.take_snapshot(&mut last).is_none());
    }

    #[test]
    fn test_elapsed_never_goes_backwards() {
        let (queue, feed) = feed(5);
        let mut last = 2.5;
        queue.push(vec![0.0]);
        let snap = feed.take_snapshot(&mut last).unwrap();
        assert_eq!(snap.elapsed_secs, 2.5);
    }

    #[tokio::test]
    async fn test_stream_emits_queued_samples_then_ends_on_cancel() {
        let (queue, feed) = feed(100);
        let cancel = CancellationToken::new();
        queue.push(vec![0.25; 10]);

        let snapshots = feed.snapshots(cancel.clone());
        futures_util::pin_mut!(snapshots);

        let first = snapshots.next().await.unwrap();
        assert_eq!(first.samples.len(), 10);

        cancel.cancel();
        assert!(snapshots.next().await.is_none());
    }

    #[tokio::test]
    async fn test_emitter_forwards_and_stops() {
        let (queue, feed) = feed(100);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        let task = tokio::spawn(run_waveform_emitter(feed, tx, cancel.clone()));
        queue.push(vec![0.5; 8]);

        let snap = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.samples, vec![0.5; 8]);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
