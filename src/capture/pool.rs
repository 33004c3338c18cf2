//! Fixed pool of driver-shared frame buffers.
//!
//! Each buffer is in exactly one of two states: DriverOwned (queued for the
//! hardware to fill) or AppOwned (dequeued, readable by the consumer). The
//! capture thread never touches AppOwned buffers and the consumer never
//! touches DriverOwned ones, so the two threads' access windows are
//! disjoint; the per-slot mutex satisfies the type system and is
//! uncontended under that invariant.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Ownership state of one pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Queued to the driver, waiting to be filled.
    DriverOwned,
    /// Dequeued; the consumer may read it until release.
    AppOwned,
}

struct PoolInner {
    states: Vec<BufferState>,
    /// FIFO of driver-queued buffer indices, in fill order.
    queued: VecDeque<usize>,
}

/// A fixed set of frame buffers cycled between driver and application.
pub struct BufferPool {
    frames: Vec<Mutex<Vec<u8>>>,
    inner: Mutex<PoolInner>,
    filled: Condvar,
}

/// Read guard over one AppOwned buffer's bytes.
pub struct FrameGuard<'a> {
    guard: MutexGuard<'a, Vec<u8>>,
}

impl Deref for FrameGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl BufferPool {
    /// Allocates `count` zeroed buffers of `frame_len` bytes each.
    ///
    /// Buffers start DriverOwned but unqueued; [`BufferPool::queue_all`]
    /// enqueues them when streaming starts.
    pub fn new(count: usize, frame_len: usize) -> Self {
        Self {
            frames: (0..count).map(|_| Mutex::new(vec![0u8; frame_len])).collect(),
            inner: Mutex::new(PoolInner {
                states: vec![BufferState::DriverOwned; count],
                queued: VecDeque::new(),
            }),
            filled: Condvar::new(),
        }
    }

    /// Number of buffers in the pool.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the pool holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Queues every buffer to the driver, in index order.
    pub fn queue_all(&self) {
        let mut inner = self.lock_inner();
        inner.queued.clear();
        for state in inner.states.iter_mut() {
            *state = BufferState::DriverOwned;
        }
        inner.queued.extend(0..self.frames.len());
        drop(inner);
        self.filled.notify_all();
    }

    /// Dequeues the next driver-queued buffer, blocking up to `timeout`.
    ///
    /// The wait tolerates spurious wakeups by re-checking the queue against
    /// a deadline. Returns `None` when the timeout elapses with nothing
    /// queued (pool starved or driver wedged).
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<usize> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock_inner();

        loop {
            if let Some(index) = inner.queued.pop_front() {
                inner.states[index] = BufferState::AppOwned;
                return Some(index);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = self
                .filled
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
    }

    /// Returns an AppOwned buffer to the driver queue.
    pub fn requeue(&self, index: usize) {
        let mut inner = self.lock_inner();
        assert_eq!(
            inner.states[index],
            BufferState::AppOwned,
            "release of a buffer the application does not own"
        );
        inner.states[index] = BufferState::DriverOwned;
        inner.queued.push_back(index);
        drop(inner);
        self.filled.notify_one();
    }

    /// Driver-side write access to a buffer (backend fill path).
    pub fn fill(&self, index: usize, write: impl FnOnce(&mut [u8])) {
        let mut frame = self.frames[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        write(&mut frame);
    }

    /// Read access to an AppOwned buffer.
    pub fn frame(&self, index: usize) -> FrameGuard<'_> {
        {
            let inner = self.lock_inner();
            assert_eq!(
                inner.states[index],
                BufferState::AppOwned,
                "read of a buffer the application does not own"
            );
        }
        FrameGuard {
            guard: self.frames[index].lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Current state of a buffer.
    pub fn state(&self, index: usize) -> BufferState {
        self.lock_inner().states[index]
    }

    fn lock_inner(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
