//! Adaptive background model: frame history ring plus running mean.
//!
//! The mean is a sliding-window average over exactly the last
//! [`HISTORY_DEPTH`] frames, maintained incrementally. It is not an
//! exponential moving average: each update subtracts the evicted frame's
//! contribution and adds the new frame's, so the window never drifts.

use crate::plane::{MeanPlane, Planar444Plane};

/// Number of frames in the background history ring.
pub const HISTORY_DEPTH: usize = 10;

/// Depth-N ring of historical frames with a running per-pixel float mean.
///
/// The ring is sealed: slots are only reachable through
/// [`BackgroundModel::fold_frame`] and [`BackgroundModel::update`]. The
/// cursor always names the slot to be overwritten next, whose prior
/// contents were last subtracted from the mean.
pub struct BackgroundModel {
    history: Vec<Planar444Plane>,
    mean: MeanPlane,
    cursor: usize,
    folded: usize,
}

impl BackgroundModel {
    /// Creates an unprimed model for the given geometry.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            history: (0..HISTORY_DEPTH)
                .map(|_| Planar444Plane::new(width, height))
                .collect(),
            mean: MeanPlane::new(width, height),
            cursor: 0,
            folded: 0,
        }
    }

    /// True once [`HISTORY_DEPTH`] frames have been folded in.
    pub fn is_primed(&self) -> bool {
        self.folded >= HISTORY_DEPTH
    }

    /// Number of bootstrap frames folded so far.
    pub fn frames_folded(&self) -> usize {
        self.folded
    }

    /// Folds a bootstrap frame into the mean and stores it in the ring.
    ///
    /// Only valid before the model is primed; each pixel channel
    /// contributes `value / N` to the mean.
    pub fn fold_frame(&mut self, frame: &Planar444Plane) {
        assert!(!self.is_primed(), "model already primed, use update");
        self.assert_geometry(frame);

        let n = HISTORY_DEPTH as f32;
        for (mean, &sample) in self.mean.samples_mut().iter_mut().zip(frame.samples()) {
            *mean += sample as f32 / n;
        }

        self.history[self.cursor]
            .samples_mut()
            .copy_from_slice(frame.samples());
        self.cursor = (self.cursor + 1) % HISTORY_DEPTH;
        self.folded += 1;
    }

    /// Slides the window forward by one frame.
    ///
    /// The evicted slot is read before it is overwritten: its contribution
    /// leaves the mean as the new frame's enters
    /// (`mean += new/N - oldest/N`), then the new frame replaces the slot
    /// and the cursor advances.
    pub fn update(&mut self, frame: &Planar444Plane) {
        assert!(self.is_primed(), "model not primed, use fold_frame");
        self.assert_geometry(frame);

        let n = HISTORY_DEPTH as f32;
        let slot = self.cursor;
        for ((mean, &sample), &oldest) in self
            .mean
            .samples_mut()
            .iter_mut()
            .zip(frame.samples())
            .zip(self.history[slot].samples())
        {
            *mean += sample as f32 / n - oldest as f32 / n;
        }

        self.history[slot]
            .samples_mut()
            .copy_from_slice(frame.samples());
        self.cursor = (self.cursor + 1) % HISTORY_DEPTH;
    }

    /// Readback of the current per-pixel mean.
    pub fn mean(&self) -> &MeanPlane {
        &self.mean
    }

    fn assert_geometry(&self, frame: &Planar444Plane) {
        assert!(
            frame.width() == self.mean.width() && frame.height() == self.mean.height(),
            "frame geometry does not match the model"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_frame(width: usize, height: usize, value: u8) -> Planar444Plane {
        Planar444Plane::from_vec(vec![value; width * height * 3], width, height)
    }

    #[test]
    fn test_primed_after_history_depth_folds() {
        let mut model = BackgroundModel::new(4, 2);
        for i in 0..HISTORY_DEPTH {
            assert!(!model.is_primed());
            model.fold_frame(&constant_frame(4, 2, i as u8));
        }
        assert!(model.is_primed());
    }

    #[test]
    fn test_mean_of_constant_bootstrap() {
        let mut model = BackgroundModel::new(4, 2);
        for _ in 0..HISTORY_DEPTH {
            model.fold_frame(&constant_frame(4, 2, 50));
        }

        for &value in model.mean().samples() {
            assert!((value - 50.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_sliding_window_matches_arithmetic_mean() {
        // Fold N frames then keep updating: the mean must equal the plain
        // average of the last N observed frames, however long the sequence.
        let mut model = BackgroundModel::new(4, 2);
        let values: Vec<u8> = (0..35).map(|i| (i * 7 + 3) as u8).collect();

        for &value in values.iter().take(HISTORY_DEPTH) {
            model.fold_frame(&constant_frame(4, 2, value));
        }
        for &value in values.iter().skip(HISTORY_DEPTH) {
            model.update(&constant_frame(4, 2, value));
        }

        let window = &values[values.len() - HISTORY_DEPTH..];
        let expected: f32 =
            window.iter().map(|&v| v as f32).sum::<f32>() / HISTORY_DEPTH as f32;

        for &value in model.mean().samples() {
            assert!(
                (value - expected).abs() < 1e-2,
                "mean {value} drifted from window average {expected}"
            );
        }
    }

    #[test]
    #[should_panic(expected = "not primed")]
    fn test_update_before_priming_panics() {
        let mut model = BackgroundModel::new(4, 2);
        model.update(&constant_frame(4, 2, 0));
    }

    #[test]
    #[should_panic(expected = "already primed")]
    fn test_fold_after_priming_panics() {
        let mut model = BackgroundModel::new(4, 2);
        for _ in 0..HISTORY_DEPTH {
            model.fold_frame(&constant_frame(4, 2, 1));
        }
        model.fold_frame(&constant_frame(4, 2, 1));
    }
}
