//! Capture device handling and the frame-handoff worker.
//!
//! This module owns the hardware side of the system: format negotiation,
//! the fixed pool of driver-shared frame buffers, the blocking fetch with a
//! bounded timeout, and the capture thread that posts buffer indices to the
//! processing loop.

mod config;
mod device;
mod mock;
mod pool;
#[cfg(feature = "v4l2")]
mod v4l2;
mod worker;

pub use config::{CaptureConfig, ConfigError, FileConfig, OutputConfig};
pub use device::{bring_up, CaptureDevice, CaptureError, FrameFormat, MIN_BUFFERS};
pub use mock::{FrameGenerator, MockDevice};
pub use pool::{BufferPool, BufferState, FrameGuard};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Device;
pub use worker::{spawn_capture_loop, CancelToken, CaptureEvent};
