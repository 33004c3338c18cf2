//! Per-pixel adaptive sensitivity mask.
//!
//! Each pixel carries a scalar in [0, 1] that scales the measured
//! difference before thresholding. Quiet pixels recover sensitivity in
//! small steps; pixels classified as foreground lose it in larger steps,
//! which suppresses flicker and ghosting after a real motion event.

/// Adaptive per-pixel sensitivity field, clamped to [0, 1].
pub struct SensitivityMask {
    values: Vec<f32>,
}

impl SensitivityMask {
    /// Creates a mask at full sensitivity (1.0 everywhere).
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            values: vec![1.0f32; width * height],
        }
    }

    /// Number of pixels covered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the mask covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The sensitivity scalar for a pixel index.
    #[inline]
    pub fn value(&self, index: usize) -> f32 {
        self.values[index]
    }

    /// Raises sensitivity after a background classification.
    #[inline]
    pub fn restore(&mut self, index: usize, step: f32) {
        self.values[index] = (self.values[index] + step).clamp(0.0, 1.0);
    }

    /// Lowers sensitivity after a foreground classification.
    #[inline]
    pub fn dampen(&mut self, index: usize, step: f32) {
        self.values[index] = (self.values[index] - step).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_starts_fully_sensitive() {
        let mask = SensitivityMask::new(4, 4);
        assert!((0..mask.len()).all(|i| mask.value(i) == 1.0));
    }

    #[test]
    fn test_dampen_outpaces_restore() {
        let mut mask = SensitivityMask::new(1, 1);
        mask.dampen(0, 0.05);
        mask.restore(0, 0.01);
        assert!((mask.value(0) - 0.96).abs() < 1e-6);
    }

    #[test]
    fn test_clamped_at_full_sensitivity() {
        let mut mask = SensitivityMask::new(1, 1);
        mask.restore(0, 0.5);
        assert_eq!(mask.value(0), 1.0);
    }

    proptest! {
        #[test]
        fn prop_mask_stays_in_unit_interval(
            classifications in prop::collection::vec(any::<bool>(), 0..500)
        ) {
            let mut mask = SensitivityMask::new(1, 1);
            for foreground in classifications {
                if foreground {
                    mask.dampen(0, 0.05);
                } else {
                    mask.restore(0, 0.01);
                }
                prop_assert!((0.0..=1.0).contains(&mask.value(0)));
            }
        }
    }
}
