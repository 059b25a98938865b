//! Bounded drop-oldest queue for the visualization mirror
//!
//! The capture callback pushes a flattened copy of every chunk here. When the
//! queue is full the oldest unread chunk is evicted, so the producer never
//! waits on the visualization consumer.
//!
//! # Memory Budget
//!
//! At 44.1kHz mono with ~10ms callbacks (441 samples × 4 bytes):
//! - 1000 chunks × 1,764 bytes ≈ 1.7 MB worst case

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of chunks retained for visualization
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Fixed-capacity ring of sample chunks with drop-oldest backpressure.
///
/// Thread-safety: internally synchronized. The lock is only held for a
/// `VecDeque` pop/push or a drain, so the real-time producer never waits for
/// longer than that.
#[derive(Debug)]
pub struct BoundedSampleQueue {
    chunks: Mutex<VecDeque<Vec<f32>>>,
    capacity: usize,
    /// Mirror of `chunks.len()` so `is_empty` never takes the lock
    len: AtomicUsize,
    dropped: AtomicU64,
}

impl BoundedSampleQueue {
    /// Create a queue holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            len: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<f32>>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a chunk, evicting the oldest one if the queue is full.
    pub fn push(&self, chunk: Vec<f32>) {
        let mut chunks = self.lock();
        if chunks.len() >= self.capacity {
            chunks.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        chunks.push_back(chunk);
        self.len.store(chunks.len(), Ordering::Release);
    }

    /// Remove and return every queued chunk, oldest first.
    pub fn drain_all(&self) -> Vec<Vec<f32>> {
        let mut chunks = self.lock();
        let drained: Vec<Vec<f32>> = chunks.drain(..).collect();
        self.len.store(0, Ordering::Release);
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of chunks evicted since creation (or the last `clear`)
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let mut chunks = self.lock();
        chunks.clear();
        self.len.store(0, Ordering::Release);
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Empty the queue, handing back what was there so it can be put back.
    pub(crate) fn take_contents(&self) -> QueueContents {
        let mut chunks = self.lock();
        let taken = std::mem::take(&mut *chunks);
        self.len.store(0, Ordering::Release);
        QueueContents {
            chunks: taken,
            dropped: self.dropped.swap(0, Ordering::Relaxed),
        }
    }

    /// Replace the queue with contents taken earlier.
    pub(crate) fn restore_contents(&self, contents: QueueContents) {
        let mut chunks = self.lock();
        *chunks = contents.chunks;
        self.len.store(chunks.len(), Ordering::Release);
        self.dropped.store(contents.dropped, Ordering::Relaxed);
    }
}

/// Queue contents removed by `take_contents`.
#[derive(Debug)]
pub(crate) struct QueueContents {
    chunks: VecDeque<Vec<f32>>,
    dropped: u64,
}

impl Default for BoundedSampleQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
