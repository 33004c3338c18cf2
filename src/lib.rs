//! Motion Watch
//!
//! Real-time motion detection over memory-mapped video capture using an
//! adaptive per-pixel background model.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → plane conversion → detection → display
//!     ↓            ↓               ↓
//! buffer pool  packed/planar  background model + sensitivity mask
//! ```
//!
//! A capture loop on its own thread blocks on the device for the next
//! filled buffer and posts only the buffer index into a bounded
//! single-slot channel; the processing loop converts the packed frame to
//! planar form, releases the buffer, and runs the detection pipeline. No
//! frame bytes cross the thread boundary.
//!
//! # Design Principles
//!
//! - **Crash over ambiguity**: capture-layer failures are fatal; a kernel
//!   capture interface offers no recovery path worth pretending about.
//! - **Fixed geometry**: one frame size, one history depth, one binary
//!   classification; this is not a general vision library.
//! - **Sealed state**: the history ring, buffer states, and sensitivity
//!   mask are only reachable through their owning types.
//!
//! # Example
//!
//! ```no_run
//! use motion_watch::{
//!     capture::{bring_up, CaptureConfig, CaptureDevice, MockDevice},
//!     detect::{DetectConfig, DetectionPipeline},
//!     plane::{packed422_to_planar444, Packed422View, Planar444Plane},
//! };
//!
//! let config = CaptureConfig::with_dimensions(320, 240);
//! let device = MockDevice::open(&config).unwrap();
//! let format = bring_up(&device, &config).unwrap();
//!
//! let mut pipeline = DetectionPipeline::new(320, 240, &DetectConfig::default());
//! let mut planar = Planar444Plane::new(320, 240);
//!
//! for _ in 0..20 {
//!     let index = device.fetch_frame(config.fetch_timeout()).unwrap().unwrap();
//!     {
//!         let bytes = device.frame(index);
//!         let view = Packed422View::new(&bytes[..format.size_image as usize], 320, 240);
//!         packed422_to_planar444(view, &mut planar);
//!     }
//!     device.release_frame(index);
//!
//!     if let Some(result) = pipeline.process(&planar) {
//!         println!("motion: {:?}", result.bounds);
//!     }
//! }
//! device.close();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod batch;
pub mod capture;
pub mod detect;
pub mod display;
pub mod plane;

// Re-export commonly used types at crate root
pub use capture::{
    bring_up, spawn_capture_loop, CancelToken, CaptureConfig, CaptureDevice, CaptureError,
    CaptureEvent, FileConfig, MockDevice,
};
pub use detect::{DetectConfig, DetectionPipeline, DetectionResult, MotionRect};
pub use display::{DisplaySink, HeadlessDisplay, UiEvent, ViewMode};
pub use plane::{MeanPlane, Packed422Plane, Packed422View, Planar444Plane};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
