//! Capture device abstraction.
//!
//! This module provides a trait-based abstraction over the capture
//! hardware, allowing both a real memory-mapped V4L2 backend and a mock
//! implementation for testing. All methods take `&self`: the device is
//! shared between the capture thread (fetch) and the processing thread
//! (read + release) behind an `Arc`.

use super::config::CaptureConfig;
use super::pool::FrameGuard;
use std::time::Duration;
use thiserror::Error;

/// Minimum number of driver buffers required to stream.
pub const MIN_BUFFERS: u32 = 2;

/// Errors that can occur in the capture layer.
///
/// Every variant is unrecoverable for the process; the only retry path is
/// the `Ok(None)` "not ready" sentinel returned by
/// [`CaptureDevice::fetch_frame`].
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture device busy: {0}")]
    DeviceBusy(String),
    #[error("capture device error: {0}")]
    DeviceError(String),
    #[error("pixel format not supported: {0}")]
    FormatUnsupported(String),
    #[error("driver granted {granted} buffers, need at least 2")]
    InsufficientBuffers { granted: u32 },
    #[error("failed to map capture buffer: {0}")]
    MapFailed(String),
    #[error("timed out waiting for a frame")]
    TimeoutExceeded,
}

/// The effective frame format after negotiation.
///
/// The driver is authoritative: it may report a larger row stride or image
/// size than requested, and those values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row stride in bytes (at least `width * 2` for packed 4:2:2).
    pub bytes_per_line: u32,
    /// Total image size in bytes (at least `bytes_per_line * height`).
    pub size_image: u32,
}

impl FrameFormat {
    /// Builds the tight packed 4:2:2 format for the given geometry.
    pub fn packed422(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_line: width * 2,
            size_image: width * 2 * height,
        }
    }
}

/// Trait for capture device implementations.
///
/// Lifecycle: construct (open) → `negotiate` → `allocate_buffers` →
/// `start_streaming` → repeated `fetch_frame` / `frame` / `release_frame` →
/// `stop_streaming` → `close`. Implementations make `close` idempotent and
/// call it from `Drop`, so every path out of the capture lifetime reaches
/// the cleanup exactly once.
pub trait CaptureDevice: Send + Sync {
    /// Requests packed 4:2:2 at the given geometry and returns what the
    /// driver actually configured.
    fn negotiate(&self, width: u32, height: u32) -> Result<FrameFormat, CaptureError>;

    /// Requests a pool of memory-mapped buffers. Returns the granted count.
    fn allocate_buffers(&self, count: u32) -> Result<u32, CaptureError>;

    /// Queues all buffers to the driver and starts capture.
    fn start_streaming(&self) -> Result<(), CaptureError>;

    /// Stops capture. Idempotent.
    fn stop_streaming(&self) -> Result<(), CaptureError>;

    /// Blocks until a buffer is filled or the timeout elapses.
    ///
    /// `Ok(Some(index))` hands the buffer to the caller (AppOwned);
    /// `Ok(None)` is the transient "no frame yet, retry" sentinel;
    /// `Err(TimeoutExceeded)` means the device is wedged and is treated as
    /// fatal by the capture loop.
    fn fetch_frame(&self, timeout: Duration) -> Result<Option<usize>, CaptureError>;

    /// Read access to an AppOwned buffer's bytes.
    fn frame(&self, index: usize) -> FrameGuard<'_>;

    /// Returns the buffer to the driver (AppOwned → DriverOwned).
    ///
    /// Failing to release every fetched buffer starves the pool.
    fn release_frame(&self, index: usize);

    /// The format negotiated with the driver.
    fn format(&self) -> FrameFormat;

    /// Stops streaming if active, unmaps buffers, closes the handle.
    fn close(&self);
}

/// Drives a freshly opened device through negotiation, buffer allocation,
/// and stream start, returning the effective format.
pub fn bring_up<D: CaptureDevice>(
    device: &D,
    config: &CaptureConfig,
) -> Result<FrameFormat, CaptureError> {
    let format = device.negotiate(config.width, config.height)?;
    let granted = device.allocate_buffers(config.buffer_count)?;
    device.start_streaming()?;

    tracing::info!(
        width = format.width,
        height = format.height,
        bytes_per_line = format.bytes_per_line,
        buffers = granted,
        "capture device streaming"
    );

    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed422_format_extent() {
        let format = FrameFormat::packed422(320, 240);
        assert_eq!(format.bytes_per_line, 640);
        assert_eq!(format.size_image, 640 * 240);
    }
}
