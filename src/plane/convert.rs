//! Whole-plane conversions between the three frame encodings.
//!
//! Converters are into-style: the caller supplies the destination plane so
//! the steady-state loop never allocates per frame. Dimensions must match.

use super::{MeanPlane, Packed422Plane, Packed422View, Planar444Plane};

/// Expands packed 4:2:2 into planar 4:4:4.
///
/// The chroma pair shared by two packed pixels is duplicated across both
/// output pixels.
pub fn packed422_to_planar444(src: Packed422View<'_>, dst: &mut Planar444Plane) {
    assert_eq!(src.width(), dst.width(), "plane width mismatch");
    assert_eq!(src.height(), dst.height(), "plane height mismatch");

    for x in (0..src.width()).step_by(2) {
        for y in 0..src.height() {
            let [y1, u, v] = src.get(x, y);
            let y2 = src.get(x + 1, y)[0];

            dst.set(x, y, [y1, u, v]);
            dst.set(x + 1, y, [y2, u, v]);
        }
    }
}

/// Subsamples planar 4:4:4 back to packed 4:2:2.
///
/// Luma is carried through exactly; the pair's two chroma samples are
/// integer-averaged into the shared chroma bytes.
pub fn planar444_to_packed422(src: &Planar444Plane, dst: &mut Packed422Plane) {
    assert_eq!(src.width(), dst.width(), "plane width mismatch");
    assert_eq!(src.height(), dst.height(), "plane height mismatch");

    for x in (0..src.width()).step_by(2) {
        for y in 0..src.height() {
            let [y1, u1, v1] = src.get(x, y);
            let [y2, u2, v2] = src.get(x + 1, y);

            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            dst.set(x, y, [y1, u, v]);
            dst.set(x + 1, y, [y2, u, v]);
        }
    }
}

/// Renders the float background model as packed 4:2:2.
///
/// Each float channel is truncated to an integer value (not rounded) before
/// the pairwise chroma average, matching the model's display path.
pub fn mean_to_packed422(src: &MeanPlane, dst: &mut Packed422Plane) {
    assert_eq!(src.width(), dst.width(), "plane width mismatch");
    assert_eq!(src.height(), dst.height(), "plane height mismatch");

    for x in (0..src.width()).step_by(2) {
        for y in 0..src.height() {
            let a = src.get(x, y);
            let b = src.get(x + 1, y);

            let y1 = a[0] as u8;
            let y2 = b[0] as u8;
            let u = ((a[1] as u8 as u16 + b[1] as u8 as u16) / 2) as u8;
            let v = ((a[2] as u8 as u16 + b[2] as u8 as u16) / 2) as u8;

            dst.set(x, y, [y1, u, v]);
            dst.set(x + 1, y, [y2, u, v]);
        }
    }
}
