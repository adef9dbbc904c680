//! Bounded frame queue between the real-time capture callback and the
//! session loop.
//!
//! Single-producer/single-consumer. The producer side never blocks beyond a
//! short critical section: when the queue is full the oldest frame is dropped
//! and counted. The consumer side suspends on an empty queue until a frame
//! arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::Frame;

struct Inner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded FIFO of audio frames with an atomically observable depth.
///
/// The depth counter is written from both the capture context and the
/// consumer context, so it is kept in an atomic rather than derived from the
/// deque under the lock.
pub struct FrameQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    depth: AtomicUsize,
    dropped: AtomicU64,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            available: Condvar::new(),
            depth: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a frame from the capture callback.
    ///
    /// Never waits for the consumer. On overflow the oldest frame is dropped
    /// so the newest audio is retained. Frames pushed after `close` are
    /// discarded.
    pub fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
        if inner.closed {
            return;
        }
        if inner.frames.len() >= self.capacity {
            inner.frames.pop_front();
            self.depth.fetch_sub(1, Ordering::Relaxed);
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(dropped, "Frame queue full, dropping oldest frame");
        }
        inner.frames.push_back(frame);
        self.depth.fetch_add(1, Ordering::Relaxed);
        drop(inner);
        self.available.notify_one();
    }

    /// Dequeue the next frame, suspending while the queue is empty.
    ///
    /// Returns `None` once the queue has been closed and drained.
    pub fn pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .expect("frame queue mutex poisoned");
        }
    }

    /// Non-blocking dequeue. Returns `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
        let frame = inner.frames.pop_front()?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Number of frames currently queued.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Total frames dropped to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Maximum number of frames the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the queue, waking a blocked consumer.
    ///
    /// Already-queued frames remain poppable; subsequent pushes are dropped.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .expect("frame queue mutex poisoned")
            .closed
    }
}
