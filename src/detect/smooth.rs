//! Gaussian-plus-median smoothing of the classified motion image.
//!
//! A fixed odd-sized kernel is built once per call. For every output pixel
//! the luma neighborhood is both convolved with the Gaussian weights and
//! median-filtered; only the median gates the emitted pixel, but the
//! convolution is part of the documented algorithm and its total energy is
//! returned as a diagnostic.

use super::DetectConfig;
use crate::plane::Planar444Plane;

/// Smooths the binary motion image into the final detection image.
pub struct Smoother {
    kernel_size: usize,
    sigma: f32,
    luma_threshold: u8,
}

impl Smoother {
    /// Creates a smoother from the detection configuration.
    ///
    /// The kernel size must be odd.
    pub fn new(config: &DetectConfig) -> Self {
        assert!(
            config.kernel_size % 2 == 1,
            "smoothing kernel size must be odd"
        );
        Self {
            kernel_size: config.kernel_size,
            sigma: config.sigma,
            luma_threshold: config.smooth_luma_threshold,
        }
    }

    /// Builds the Gaussian weight table.
    ///
    /// Weights are normalized by the continuous 2-D Gaussian constant
    /// `1/(2*pi*sigma^2)`, not re-scaled to sum to one after
    /// discretization; the slight bias is intended.
    fn gaussian_kernel(&self) -> Vec<f32> {
        let size = self.kernel_size;
        let radius = (size / 2) as isize;
        let norm = 1.0 / (2.0 * std::f32::consts::PI * self.sigma * self.sigma);
        let denom = 2.0 * self.sigma * self.sigma;

        let mut kernel = Vec::with_capacity(size * size);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let distance_sq = (dx * dx + dy * dy) as f32;
                kernel.push(norm * (-distance_sq / denom).exp());
            }
        }
        kernel
    }

    /// Smooths `src` into `dst`, returning the total convolution energy.
    ///
    /// Out-of-bounds neighbors are skipped, not reflected or clamped, so
    /// border pixels see an asymmetrically smaller neighborhood; that edge
    /// artifact is reproduced deliberately. The output pixel is binarized
    /// on the neighborhood median: full-bright luma if the median exceeds
    /// the threshold, zero otherwise, with neutral chroma.
    pub fn smooth(&self, src: &Planar444Plane, dst: &mut Planar444Plane) -> f64 {
        assert!(
            src.width() == dst.width() && src.height() == dst.height(),
            "plane geometry mismatch"
        );

        let kernel = self.gaussian_kernel();
        let size = self.kernel_size;
        let radius = (size / 2) as isize;
        let width = src.width() as isize;
        let height = src.height() as isize;

        let mut neighborhood: Vec<u8> = Vec::with_capacity(size * size);
        let mut total_energy = 0.0f64;

        for y in 0..height {
            for x in 0..width {
                neighborhood.clear();
                let mut convolution = 0.0f32;

                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let nx = x + dx;
                        let ny = y + dy;
                        if nx < 0 || nx >= width || ny < 0 || ny >= height {
                            continue;
                        }

                        let luma = src.get(nx as usize, ny as usize)[0];
                        let weight =
                            kernel[((dy + radius) * size as isize + (dx + radius)) as usize];
                        convolution += weight * luma as f32;
                        neighborhood.push(luma);
                    }
                }

                total_energy += convolution as f64;

                // Linear-time selection; a full sort would be wasted on a
                // nine-element neighborhood.
                let mid = neighborhood.len() / 2;
                let (_, median, _) = neighborhood.select_nth_unstable(mid);
                let luma = if *median > self.luma_threshold { 255 } else { 0 };

                dst.set(x as usize, y as usize, [luma, 127, 127]);
            }
        }

        total_energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort_based_median(values: &[u8]) -> u8 {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted[sorted.len() / 2]
    }

    fn plane_from_lumas(lumas: &[&[u8]]) -> Planar444Plane {
        let height = lumas.len();
        let width = lumas[0].len();
        let mut plane = Planar444Plane::new(width, height);
        for (y, row) in lumas.iter().enumerate() {
            for (x, &luma) in row.iter().enumerate() {
                plane.set(x, y, [luma, 127, 127]);
            }
        }
        plane
    }

    #[test]
    fn test_median_matches_sort_based_reference() {
        // The interior pixel of a 3x3 input sees the full neighborhood.
        let values = [90u8, 250, 10, 255, 240, 80, 255, 255, 200];
        let src = plane_from_lumas(&[&values[0..3], &values[3..6], &values[6..9]]);
        let mut dst = Planar444Plane::new(3, 3);

        let smoother = Smoother::new(&DetectConfig::default());
        smoother.smooth(&src, &mut dst);

        let expected = if sort_based_median(&values) > 240 { 255 } else { 0 };
        assert_eq!(dst.get(1, 1)[0], expected);
    }

    #[test]
    fn test_solid_white_stays_white_inside() {
        let src = plane_from_lumas(&[
            &[255, 255, 255, 255],
            &[255, 255, 255, 255],
            &[255, 255, 255, 255],
        ]);
        let mut dst = Planar444Plane::new(4, 3);

        let smoother = Smoother::new(&DetectConfig::default());
        smoother.smooth(&src, &mut dst);

        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(dst.get(x, y), [255, 127, 127]);
            }
        }
    }

    #[test]
    fn test_isolated_speckle_removed() {
        let src = plane_from_lumas(&[
            &[0, 0, 0],
            &[0, 255, 0],
            &[0, 0, 0],
        ]);
        let mut dst = Planar444Plane::new(3, 3);

        let smoother = Smoother::new(&DetectConfig::default());
        smoother.smooth(&src, &mut dst);

        // A single white pixel never carries the neighborhood median.
        assert_eq!(dst.get(1, 1)[0], 0);
    }

    #[test]
    fn test_convolution_energy_is_reported() {
        let src = plane_from_lumas(&[
            &[255, 255, 255],
            &[255, 255, 255],
            &[255, 255, 255],
        ]);
        let zero_src = Planar444Plane::new(3, 3);
        let mut dst = Planar444Plane::new(3, 3);

        let smoother = Smoother::new(&DetectConfig::default());
        let bright = smoother.smooth(&src, &mut dst);
        let dark = smoother.smooth(&zero_src, &mut dst);

        assert!(bright > 0.0);
        assert_eq!(dark, 0.0);
    }

    #[test]
    fn test_corner_median_uses_partial_neighborhood() {
        // Corner (0,0) sees only four in-bounds neighbors; with two white
        // and two black the upper median (index 2 of 4) is white.
        let src = plane_from_lumas(&[
            &[255, 255, 0],
            &[0, 0, 0],
            &[0, 0, 0],
        ]);
        let mut dst = Planar444Plane::new(3, 3);

        let smoother = Smoother::new(&DetectConfig::default());
        smoother.smooth(&src, &mut dst);

        assert_eq!(dst.get(0, 0)[0], 255);
    }
}
