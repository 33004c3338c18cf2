//! Batch test harness.
//!
//! Runs the detection pipeline over a directory of numbered image files
//! instead of a live device: each input is decoded, converted to planar
//! 4:4:4 with BT.601 coefficients, fed through the pipeline once, and the
//! smoothed luma plane is written back out as a greyscale image. Reports
//! aggregate throughput. A collaborator of the core, not part of it.

use crate::detect::{DetectConfig, DetectionPipeline};
use crate::plane::Planar444Plane;
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from the batch harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("no input images found in {0}")]
    EmptyInput(PathBuf),
    #[error("{path} is {got_width}x{got_height}, expected {want_width}x{want_height}")]
    GeometryMismatch {
        path: PathBuf,
        got_width: u32,
        got_height: u32,
        want_width: u32,
        want_height: u32,
    },
}

/// Aggregate results of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Frames fed through the pipeline (bootstrap included).
    pub frames: usize,
    /// Frames on which a non-zero motion rectangle was reported.
    pub detections: usize,
    /// Wall-clock time of the processing loop.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Average throughput in frames per second.
    pub fn fps(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.frames as f64 / self.elapsed.as_secs_f64()
    }
}

/// Converts an RGB image into a planar 4:4:4 YUV plane (BT.601).
pub fn rgb_to_planar444(img: &RgbImage) -> Planar444Plane {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let mut plane = Planar444Plane::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);

        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        let u = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let v = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;

        plane.set(
            x as usize,
            y as usize,
            [
                luma.clamp(0.0, 255.0) as u8,
                u.clamp(0.0, 255.0) as u8,
                v.clamp(0.0, 255.0) as u8,
            ],
        );
    }
    plane
}

/// Extracts the luma channel as a greyscale image.
pub fn luma_image(plane: &Planar444Plane) -> GrayImage {
    let width = plane.width();
    let height = plane.height();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([plane.get(x as usize, y as usize)[0]])
    })
}

fn is_supported_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("png") | Some("jpg") | Some("jpeg")
    )
}

/// Runs the pipeline over every numbered image in `input_dir`.
///
/// Inputs are taken in file-name order. The first image fixes the frame
/// geometry. Bootstrap frames produce no output file; every later frame's
/// smoothed motion image lands in `output_dir` as `motion_NNNN.png`.
pub fn run(
    input_dir: &Path,
    output_dir: &Path,
    config: &DetectConfig,
) -> Result<BatchReport, HarnessError> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_supported_image(path))
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        return Err(HarnessError::EmptyInput(input_dir.to_path_buf()));
    }
    std::fs::create_dir_all(output_dir)?;

    // The first image fixes the geometry and creates the pipeline.
    let mut state: Option<((u32, u32), DetectionPipeline)> = None;
    let mut detections = 0usize;
    let mut frames = 0usize;

    let start = Instant::now();
    for (index, path) in inputs.iter().enumerate() {
        let img = image::open(path)?.to_rgb8();

        let entry = state.get_or_insert_with(|| {
            (
                (img.width(), img.height()),
                DetectionPipeline::new(img.width() as usize, img.height() as usize, config),
            )
        });
        let (want_width, want_height) = entry.0;
        if img.width() != want_width || img.height() != want_height {
            return Err(HarnessError::GeometryMismatch {
                path: path.clone(),
                got_width: img.width(),
                got_height: img.height(),
                want_width,
                want_height,
            });
        }

        let plane = rgb_to_planar444(&img);
        let pipeline = &mut entry.1;

        frames += 1;
        if let Some(result) = pipeline.process(&plane) {
            if !result.bounds.is_zero() {
                detections += 1;
                tracing::debug!(
                    frame = index,
                    x = result.bounds.x,
                    y = result.bounds.y,
                    w = result.bounds.w,
                    h = result.bounds.h,
                    "motion detected"
                );
            }
            let out_path = output_dir.join(format!("motion_{index:04}.png"));
            luma_image(pipeline.motion_image()).save(&out_path)?;
        }
    }
    let elapsed = start.elapsed();

    let report = BatchReport {
        frames,
        detections,
        elapsed,
    };
    tracing::info!(
        frames = report.frames,
        detections = report.detections,
        fps = format!("{:.1}", report.fps()),
        "batch run complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::HISTORY_DEPTH;

    #[test]
    fn test_bt601_spot_values() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        img.put_pixel(1, 0, image::Rgb([255, 0, 0]));

        let plane = rgb_to_planar444(&img);

        // White: full luma, neutral chroma.
        let white = plane.get(0, 0);
        assert!(white[0] >= 254);
        assert!((white[1] as i32 - 128).abs() <= 1);
        assert!((white[2] as i32 - 128).abs() <= 1);

        // Pure red: low luma, V saturates high.
        let red = plane.get(1, 0);
        assert!((red[0] as i32 - 76).abs() <= 1);
        assert!((red[1] as i32 - 85).abs() <= 1);
        assert!(red[2] == 255);
    }

    #[test]
    fn test_luma_image_extracts_channel() {
        let mut plane = Planar444Plane::new(2, 2);
        plane.set(0, 0, [10, 1, 2]);
        plane.set(1, 1, [200, 3, 4]);

        let img = luma_image(&plane);
        assert_eq!(img.get_pixel(0, 0).0, [10]);
        assert_eq!(img.get_pixel(1, 1).0, [200]);
        assert_eq!(img.get_pixel(1, 0).0, [0]);
    }

    #[test]
    fn test_batch_run_end_to_end() {
        let base = std::env::temp_dir().join(format!("motion-watch-batch-{}", std::process::id()));
        let input_dir = base.join("in");
        let output_dir = base.join("out");
        std::fs::create_dir_all(&input_dir).unwrap();

        // HISTORY_DEPTH dark frames to bootstrap, then two with a bright
        // square dropped in.
        for i in 0..HISTORY_DEPTH + 2 {
            let mut img = RgbImage::from_pixel(32, 24, image::Rgb([0, 0, 0]));
            if i >= HISTORY_DEPTH {
                for y in 4..20 {
                    for x in 4..28 {
                        img.put_pixel(x, y, image::Rgb([255, 255, 255]));
                    }
                }
            }
            img.save(input_dir.join(format!("frame_{i:04}.png"))).unwrap();
        }

        let report = run(&input_dir, &output_dir, &DetectConfig::default()).unwrap();

        assert_eq!(report.frames, HISTORY_DEPTH + 2);
        // Only post-bootstrap frames produce output images.
        let outputs = std::fs::read_dir(&output_dir).unwrap().count();
        assert_eq!(outputs, 2);

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn test_empty_input_dir_is_an_error() {
        let base =
            std::env::temp_dir().join(format!("motion-watch-empty-{}", std::process::id()));
        std::fs::create_dir_all(&base).unwrap();

        let result = run(&base, &base.join("out"), &DetectConfig::default());
        assert!(matches!(result, Err(HarnessError::EmptyInput(_))));

        std::fs::remove_dir_all(&base).ok();
    }
}
