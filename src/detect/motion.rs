//! Per-pixel foreground/background classification.
//!
//! Compares each incoming pixel against the background mean, scaled by the
//! adaptive sensitivity mask, and emits a binary black/white image for the
//! smoothing stage. Background learning is classification-independent: the
//! raw frame always enters the model.

use super::background::BackgroundModel;
use super::sensitivity::SensitivityMask;
use super::DetectConfig;
use crate::plane::Planar444Plane;

/// The neutral luma/chroma bias of the packed-pixel representation.
const CHANNEL_BIAS: f32 = 127.0;

/// Canonical background (black) output pixel.
pub const BACKGROUND_PIXEL: [u8; 3] = [0, 127, 127];
/// Canonical foreground (white) output pixel.
pub const FOREGROUND_PIXEL: [u8; 3] = [255, 127, 127];

/// Classifies pixels against the background model.
pub struct MotionDetector {
    magnitude_threshold: f32,
    restore_step: f32,
    dampen_step: f32,
}

impl MotionDetector {
    /// Creates a detector from the detection configuration.
    pub fn new(config: &DetectConfig) -> Self {
        Self {
            magnitude_threshold: config.magnitude_threshold,
            restore_step: config.mask_restore_step,
            dampen_step: config.mask_dampen_step,
        }
    }

    /// Classifies one frame and folds it into the background model.
    ///
    /// For each pixel the zero-centered channel difference against the mean
    /// is scaled by the pixel's sensitivity, and the Euclidean magnitude of
    /// the scaled 3-channel delta is compared against the threshold. Below:
    /// black output, sensitivity restored one step. At or above: white
    /// output, sensitivity dampened one (larger) step. Returns the number
    /// of pixels processed (diagnostic only).
    pub fn classify(
        &self,
        frame: &Planar444Plane,
        model: &mut BackgroundModel,
        mask: &mut SensitivityMask,
        output: &mut Planar444Plane,
    ) -> usize {
        let width = frame.width();
        let height = frame.height();
        let mut processed = 0;

        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                let sample = frame.get(x, y);
                let mean = model.mean().get(x, y);
                let gain = mask.value(index);

                let mut magnitude_sq = 0.0f32;
                for c in 0..3 {
                    let delta =
                        ((sample[c] as f32 - CHANNEL_BIAS) - (mean[c] - CHANNEL_BIAS)) * gain;
                    magnitude_sq += delta * delta;
                }

                if magnitude_sq.sqrt() < self.magnitude_threshold {
                    output.set(x, y, BACKGROUND_PIXEL);
                    mask.restore(index, self.restore_step);
                } else {
                    output.set(x, y, FOREGROUND_PIXEL);
                    mask.dampen(index, self.dampen_step);
                }
                processed += 1;
            }
        }

        // The model learns from the raw frame regardless of what was
        // classified above.
        model.update(frame);

        processed
    }
}
