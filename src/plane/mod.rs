//! Pixel plane addressing and conversion.
//!
//! Three frame encodings coexist in the pipeline: packed 4:2:2 as delivered
//! by the capture hardware, planar 4:4:4 bytes for the detection stages, and
//! a float plane for the background model. Each gets a typed accessor; all
//! cross-encoding traffic goes through the whole-plane converters.

mod convert;
mod packed;
mod planar;

pub use convert::{mean_to_packed422, packed422_to_planar444, planar444_to_packed422};
pub use packed::{Packed422Plane, Packed422View};
pub use planar::{MeanPlane, Planar444Plane};
