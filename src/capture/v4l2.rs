//! V4L2 capture backend (Linux, `v4l2` feature).
//!
//! Wraps a kernel capture device via the `v4l` crate: YUYV format
//! negotiation, a memory-mapped buffer stream, and the dequeue/requeue
//! cycle. The device and its stream are tied together with a
//! self-referencing struct because the stream borrows the device.

// The self-referencing expansion pins through raw pointers internally.
#![allow(unsafe_code)]

use super::config::CaptureConfig;
use super::device::{CaptureDevice, CaptureError, FrameFormat, MIN_BUFFERS};
use super::pool::{BufferPool, FrameGuard};
use ouroboros::self_referencing;
use std::os::unix::fs::FileTypeExt;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use v4l::video::Capture;

#[self_referencing]
struct StreamState {
    device: v4l::Device,
    #[borrows(device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this>,
}

struct V4l2State {
    /// Held between open and allocate_buffers, then moved into the stream.
    device: Option<v4l::Device>,
    stream: Option<StreamState>,
    streaming: bool,
    closed: bool,
}

/// Capture device backed by a V4L2 character device.
pub struct V4l2Device {
    path: String,
    format: Mutex<Option<FrameFormat>>,
    pool: OnceLock<BufferPool>,
    state: Mutex<V4l2State>,
}

impl V4l2Device {
    /// Opens the device node at `path`.
    ///
    /// Fails with `DeviceNotFound` unless the path resolves to a
    /// character-special device, `DeviceBusy`/`DeviceError` on open failure.
    pub fn open(path: &str, config: &CaptureConfig) -> Result<Self, CaptureError> {
        config
            .validate()
            .map_err(|e| CaptureError::DeviceError(e.to_string()))?;

        let metadata = std::fs::metadata(path)
            .map_err(|e| CaptureError::DeviceNotFound(format!("{path}: {e}")))?;
        if !metadata.file_type().is_char_device() {
            return Err(CaptureError::DeviceNotFound(format!(
                "{path} is not a character device"
            )));
        }

        let device = v4l::Device::with_path(path).map_err(|e| {
            if e.raw_os_error() == Some(EBUSY) {
                CaptureError::DeviceBusy(format!("{path}: {e}"))
            } else {
                CaptureError::DeviceError(format!("{path}: {e}"))
            }
        })?;

        tracing::info!(path, "v4l2 device opened");

        Ok(Self {
            path: path.to_string(),
            format: Mutex::new(None),
            pool: OnceLock::new(),
            state: Mutex::new(V4l2State {
                device: Some(device),
                stream: None,
                streaming: false,
                closed: false,
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, V4l2State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pool(&self) -> &BufferPool {
        self.pool.get().expect("buffers not allocated")
    }
}

const EBUSY: i32 = 16;

impl CaptureDevice for V4l2Device {
    fn negotiate(&self, width: u32, height: u32) -> Result<FrameFormat, CaptureError> {
        let mut state = self.lock_state();
        let device = state
            .device
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceError("device not open".into()))?;

        let mut format = device
            .format()
            .map_err(|e| CaptureError::DeviceError(format!("read format: {e}")))?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"YUYV");

        let actual = device
            .set_format(&format)
            .map_err(|e| CaptureError::DeviceError(format!("set format: {e}")))?;
        if actual.fourcc != v4l::FourCC::new(b"YUYV") {
            return Err(CaptureError::FormatUnsupported(format!(
                "{} offers {}, need YUYV",
                self.path, actual.fourcc
            )));
        }

        // Buggy driver paranoia: stride and image size may come back too
        // small; the larger of driver-reported and computed wins.
        let bytes_per_line = actual.stride.max(actual.width * 2);
        let size_image = actual.size.max(bytes_per_line * actual.height);
        let effective = FrameFormat {
            width: actual.width,
            height: actual.height,
            bytes_per_line,
            size_image,
        };

        if effective.width != width || effective.height != height {
            tracing::warn!(
                requested_width = width,
                requested_height = height,
                actual_width = effective.width,
                actual_height = effective.height,
                "driver adjusted the requested geometry"
            );
        }

        *self.format.lock().unwrap_or_else(|e| e.into_inner()) = Some(effective);
        Ok(effective)
    }

    fn allocate_buffers(&self, count: u32) -> Result<u32, CaptureError> {
        let format = self.format();
        let mut state = self.lock_state();
        let device = state
            .device
            .take()
            .ok_or_else(|| CaptureError::DeviceError("device not open".into()))?;

        if count < MIN_BUFFERS {
            return Err(CaptureError::InsufficientBuffers { granted: count });
        }

        let stream = StreamStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(
                    device,
                    v4l::buffer::Type::VideoCapture,
                    count,
                )
                .map_err(|e| CaptureError::MapFailed(e.to_string()))
            },
        }
        .try_build()?;
        state.stream = Some(stream);

        let pool = BufferPool::new(count as usize, format.size_image as usize);
        if self.pool.set(pool).is_err() {
            return Err(CaptureError::DeviceError("buffers already allocated".into()));
        }
        Ok(count)
    }

    fn start_streaming(&self) -> Result<(), CaptureError> {
        use v4l::io::traits::Stream;

        let mut state = self.lock_state();
        let stream = state
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceError("buffers not allocated".into()))?;
        stream
            .with_mut(|fields| fields.stream.start())
            .map_err(|e| CaptureError::DeviceError(format!("stream on: {e}")))?;

        self.pool().queue_all();
        state.streaming = true;
        Ok(())
    }

    fn stop_streaming(&self) -> Result<(), CaptureError> {
        use v4l::io::traits::Stream;

        let mut state = self.lock_state();
        if !state.streaming {
            return Ok(());
        }
        state.streaming = false;
        if let Some(stream) = state.stream.as_mut() {
            stream
                .with_mut(|fields| fields.stream.stop())
                .map_err(|e| CaptureError::DeviceError(format!("stream off: {e}")))?;
        }
        Ok(())
    }

    fn fetch_frame(&self, timeout: Duration) -> Result<Option<usize>, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let mut state = self.lock_state();
        if !state.streaming {
            return Err(CaptureError::DeviceError("device not streaming".into()));
        }
        let stream = state
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceError("buffers not allocated".into()))?;

        let (bytes, _meta) = match stream.with_mut(|fields| fields.stream.next()) {
            Ok(frame) => frame,
            Err(e) => {
                return match e.kind() {
                    // EAGAIN / EINTR: transient, retry the same wait.
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => Ok(None),
                    std::io::ErrorKind::TimedOut => Err(CaptureError::TimeoutExceeded),
                    _ => Err(CaptureError::DeviceError(format!("dequeue: {e}"))),
                };
            }
        };

        // The kernel edge copies into the pool slot under the safe stream
        // API; the in-process handoff from here on is index-only.
        let Some(index) = self.pool().dequeue_timeout(timeout) else {
            return Err(CaptureError::TimeoutExceeded);
        };
        self.pool().fill(index, |dst| {
            let n = dst.len().min(bytes.len());
            dst[..n].copy_from_slice(&bytes[..n]);
        });

        Ok(Some(index))
    }

    fn frame(&self, index: usize) -> FrameGuard<'_> {
        self.pool().frame(index)
    }

    fn release_frame(&self, index: usize) {
        self.pool().requeue(index);
    }

    fn format(&self) -> FrameFormat {
        self.format
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .expect("format not negotiated")
    }

    fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        state.streaming = false;
        state.closed = true;
        // Dropping the stream stops capture and unmaps every buffer.
        state.stream = None;
        state.device = None;
        tracing::info!(path = %self.path, "v4l2 device closed");
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        self.close();
    }
}
