//! Motion detection pipeline.
//!
//! The stages follow an explicit data flow:
//!
//! ```text
//! planar frame → classify (background model + sensitivity mask)
//!              → smooth (Gaussian + median)
//!              → box-find → MotionRect
//! ```
//!
//! The first [`background::HISTORY_DEPTH`] frames only prime the model
//! (bootstrap phase); no detection output is produced for them.

mod background;
mod bounds;
mod motion;
mod sensitivity;
mod smooth;

pub use background::{BackgroundModel, HISTORY_DEPTH};
pub use bounds::{BoxFinder, MotionRect};
pub use motion::{MotionDetector, BACKGROUND_PIXEL, FOREGROUND_PIXEL};
pub use sensitivity::SensitivityMask;
pub use smooth::Smoother;

use crate::plane::{MeanPlane, Planar444Plane};
use serde::{Deserialize, Serialize};

/// Tuning constants of the detection stages.
///
/// The defaults are the design values; they are exposed through the config
/// file for experimentation, not because the pipeline expects them to vary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectConfig {
    /// Euclidean magnitude threshold on the scaled 3-channel delta
    /// (channel range 0-255, so the ceiling is 255 * sqrt(3) ~ 441.7).
    pub magnitude_threshold: f32,
    /// Sensitivity regained per background classification.
    pub mask_restore_step: f32,
    /// Sensitivity lost per foreground classification (larger, so pixels
    /// desensitize faster than they recover).
    pub mask_dampen_step: f32,
    /// Smoothing kernel edge length (odd).
    pub kernel_size: usize,
    /// Gaussian sigma for the smoothing kernel.
    pub sigma: f32,
    /// Median luma above which the smoothed pixel is emitted full-bright.
    pub smooth_luma_threshold: u8,
    /// Luma above which a smoothed pixel counts as a box-finder hit.
    pub box_luma_threshold: u8,
    /// Minimum hits for a motion rectangle to be reported.
    pub min_hit_count: usize,
    /// Minimum (doubled) rectangle area to be reported.
    pub min_area: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            magnitude_threshold: 225.0,
            mask_restore_step: 0.01,
            mask_dampen_step: 0.05,
            kernel_size: 3,
            sigma: 1.5,
            smooth_luma_threshold: 240,
            box_luma_threshold: 200,
            min_hit_count: 200,
            min_area: 10,
        }
    }
}

/// One detection pass over a frame.
#[derive(Debug, Clone, Copy)]
pub struct DetectionResult {
    /// Bounding rectangle of detected motion; zero when quiet.
    pub bounds: MotionRect,
    /// Pixels classified (diagnostic).
    pub pixels_processed: usize,
    /// Total Gaussian convolution energy of the smoothing pass
    /// (diagnostic).
    pub convolution_energy: f64,
}

/// The composed detection pipeline with its bootstrap phase.
///
/// Owns the background model, the sensitivity mask, and the intermediate
/// planes, so the steady state allocates nothing per frame.
pub struct DetectionPipeline {
    model: BackgroundModel,
    mask: SensitivityMask,
    detector: MotionDetector,
    smoother: Smoother,
    finder: BoxFinder,
    classified: Planar444Plane,
    smoothed: Planar444Plane,
}

impl DetectionPipeline {
    /// Creates a pipeline for the given geometry.
    pub fn new(width: usize, height: usize, config: &DetectConfig) -> Self {
        Self {
            model: BackgroundModel::new(width, height),
            mask: SensitivityMask::new(width, height),
            detector: MotionDetector::new(config),
            smoother: Smoother::new(config),
            finder: BoxFinder::new(config),
            classified: Planar444Plane::new(width, height),
            smoothed: Planar444Plane::new(width, height),
        }
    }

    /// True once the bootstrap phase is complete.
    pub fn is_primed(&self) -> bool {
        self.model.is_primed()
    }

    /// Feeds one frame through the pipeline.
    ///
    /// Returns `None` while bootstrapping (the frame only primes the
    /// model); afterwards runs classify → smooth → box-find and returns
    /// the detection result.
    pub fn process(&mut self, frame: &Planar444Plane) -> Option<DetectionResult> {
        if !self.model.is_primed() {
            self.model.fold_frame(frame);
            tracing::debug!(
                folded = self.model.frames_folded(),
                depth = HISTORY_DEPTH,
                "bootstrap frame folded"
            );
            return None;
        }

        let pixels_processed =
            self.detector
                .classify(frame, &mut self.model, &mut self.mask, &mut self.classified);
        let convolution_energy = self.smoother.smooth(&self.classified, &mut self.smoothed);
        let bounds = self.finder.find(&self.smoothed);

        Some(DetectionResult {
            bounds,
            pixels_processed,
            convolution_energy,
        })
    }

    /// The smoothed motion image of the most recent detection pass.
    pub fn motion_image(&self) -> &Planar444Plane {
        &self.smoothed
    }

    /// Readback of the background-model mean (for display).
    pub fn background(&self) -> &MeanPlane {
        self.model.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_frame(width: usize, height: usize, pixel: [u8; 3]) -> Planar444Plane {
        let mut plane = Planar444Plane::new(width, height);
        for y in 0..height {
            for x in 0..width {
                plane.set(x, y, pixel);
            }
        }
        plane
    }

    /// Primes a pipeline over a black background.
    fn primed_pipeline(width: usize, height: usize) -> DetectionPipeline {
        let mut pipeline = DetectionPipeline::new(width, height, &DetectConfig::default());
        let background = constant_frame(width, height, [0, 127, 127]);
        for _ in 0..HISTORY_DEPTH {
            assert!(pipeline.process(&background).is_none());
        }
        assert!(pipeline.is_primed());
        pipeline
    }

    #[test]
    fn test_bootstrap_produces_no_output() {
        let mut pipeline = DetectionPipeline::new(8, 4, &DetectConfig::default());
        let frame = constant_frame(8, 4, [40, 127, 127]);
        for _ in 0..HISTORY_DEPTH {
            assert!(pipeline.process(&frame).is_none());
        }
        assert!(pipeline.process(&frame).is_some());
    }

    #[test]
    fn test_quiet_scene_reports_no_motion() {
        let mut pipeline = primed_pipeline(16, 8);
        let result = pipeline
            .process(&constant_frame(16, 8, [0, 127, 127]))
            .unwrap();

        assert!(result.bounds.is_zero());
        assert_eq!(result.pixels_processed, 16 * 8);
        for y in 0..8 {
            for x in 0..16 {
                assert_eq!(pipeline.motion_image().get(x, y)[0], 0);
            }
        }
    }

    #[test]
    fn test_solid_patch_yields_tight_box() {
        let width = 64;
        let height = 48;
        let mut pipeline = primed_pipeline(width, height);

        // Saturated patch on the black background: x in [12, 52),
        // y in [8, 40) - well over the 200-hit minimum at stride 2.
        let mut frame = constant_frame(width, height, [0, 127, 127]);
        for y in 8..40 {
            for x in 12..52 {
                frame.set(x, y, [255, 127, 127]);
            }
        }

        let result = pipeline.process(&frame).unwrap();
        let bounds = result.bounds;

        assert!(!bounds.is_zero());
        // The median filter trims at most the outermost ring; the doubled
        // box must still contain the patch footprint.
        assert_eq!(bounds.x, 12);
        assert_eq!(bounds.y, 8);
        assert_eq!(bounds.w, (50 - 12) * 2);
        assert_eq!(bounds.h, (39 - 8) * 2);
    }

    #[test]
    fn test_background_readback_tracks_scene() {
        let mut pipeline = primed_pipeline(8, 4);
        assert!((pipeline.background().get(3, 2)[0]).abs() < 1e-3);

        let bright = constant_frame(8, 4, [200, 127, 127]);
        for _ in 0..HISTORY_DEPTH {
            pipeline.process(&bright);
        }
        // After a full window of bright frames the mean has converged.
        assert!((pipeline.background().get(3, 2)[0] - 200.0).abs() < 1e-2);
    }
}
