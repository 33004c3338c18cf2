//! Capture worker thread and the frame handoff channel.
//!
//! The worker blocks on the device for the next filled buffer and posts
//! only the buffer index into a bounded single-slot channel. No frame
//! bytes cross the thread boundary. On cancellation or a fatal capture
//! error it posts a terminal `Shutdown` event so the consumer leaves its
//! event loop deterministically instead of polling the flag.

use super::device::{CaptureDevice, CaptureError};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Events posted by the capture worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A buffer was filled; the index identifies it. The receiver owns the
    /// buffer until it calls `release_frame`.
    Frame(usize),
    /// Terminal sentinel: the worker has exited and will post nothing more.
    Shutdown,
}

/// Cooperative cancellation flag shared with the capture worker.
///
/// The worker exits after its current bounded wait returns, so shutdown
/// latency is bounded by the fetch timeout.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Spawns the capture loop on its own thread.
///
/// The join handle yields `Err` if the loop died on a fatal capture error
/// (timeout included: a wedged device is not recoverable).
pub fn spawn_capture_loop<D>(
    device: Arc<D>,
    events: Sender<CaptureEvent>,
    cancel: CancelToken,
    timeout: Duration,
) -> JoinHandle<Result<(), CaptureError>>
where
    D: CaptureDevice + 'static,
{
    std::thread::spawn(move || {
        let result = capture_loop(&*device, &events, &cancel, timeout);
        if let Err(ref error) = result {
            tracing::error!(error = %error, "capture loop failed");
        }
        // Best effort: the consumer may already be gone.
        let _ = events.send(CaptureEvent::Shutdown);
        tracing::info!("capture loop exited");
        result
    })
}

fn capture_loop<D: CaptureDevice>(
    device: &D,
    events: &Sender<CaptureEvent>,
    cancel: &CancelToken,
    timeout: Duration,
) -> Result<(), CaptureError> {
    while !cancel.is_cancelled() {
        match device.fetch_frame(timeout) {
            Ok(Some(index)) => {
                tracing::trace!(index, "frame dequeued");
                if events.send(CaptureEvent::Frame(index)).is_err() {
                    // Consumer dropped the channel; nothing left to feed.
                    break;
                }
            }
            // Transient "not ready": retry the same bounded wait.
            Ok(None) => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(())
}
