//! Motion Watch CLI
//!
//! Live capture with motion detection, or a batch run of the pipeline
//! over numbered image files.

use clap::{Parser, Subcommand};
use motion_watch::capture::{
    bring_up, spawn_capture_loop, CancelToken, CaptureDevice, CaptureEvent, FileConfig,
    MockDevice,
};
use motion_watch::detect::DetectionPipeline;
use motion_watch::display::{DisplaySink, HeadlessDisplay, MotionPalette, UiEvent, ViewMode};
use motion_watch::plane::{
    mean_to_packed422, packed422_to_planar444, planar444_to_packed422, Packed422Plane,
    Packed422View, Planar444Plane,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "motion-watch", version, about = "Motion detection from live video capture")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture live video and detect motion.
    Live {
        /// Capture device path ("mock:" selects the synthetic backend).
        #[arg(long)]
        device: Option<String>,
    },
    /// Run the pipeline over numbered image files.
    Batch {
        /// Directory of input images.
        input: PathBuf,
        /// Directory for the smoothed motion images.
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("motion-watch: {e}");
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    info!("Motion Watch v{}", motion_watch::VERSION);

    let result = match cli.command {
        Command::Live { device } => run_live(config, device),
        Command::Batch { input, output } => {
            motion_watch::batch::run(&input, &output, &config.detect)
                .map(|report| {
                    println!(
                        "{} frames, {} detections, {:.1} fps",
                        report.frames,
                        report.detections,
                        report.fps()
                    );
                })
                .map_err(Into::into)
        }
    };

    if let Err(e) = result {
        eprintln!("motion-watch: {e}");
        std::process::exit(1);
    }
}

fn run_live(mut config: FileConfig, device_override: Option<String>) -> Result<(), Box<dyn Error>> {
    if let Some(device) = device_override {
        config.capture.device_path = device;
    }
    config.capture.validate()?;

    let path = config.capture.device_path.clone();
    if path.starts_with("mock:") {
        info!("using the synthetic capture backend");
        let device = Arc::new(MockDevice::open(&config.capture)?);
        run_event_loop(device, &config)
    } else {
        run_hardware(&path, &config)
    }
}

#[cfg(feature = "v4l2")]
fn run_hardware(path: &str, config: &FileConfig) -> Result<(), Box<dyn Error>> {
    let device = Arc::new(motion_watch::capture::V4l2Device::open(
        path,
        &config.capture,
    )?);
    run_event_loop(device, config)
}

#[cfg(not(feature = "v4l2"))]
fn run_hardware(path: &str, _config: &FileConfig) -> Result<(), Box<dyn Error>> {
    Err(format!(
        "{path}: V4L2 backend not compiled in; rebuild with --features v4l2 \
         or use --device mock:"
    )
    .into())
}

/// Copies padded capture rows into a tight packed view when the driver
/// reports a pitch wider than the frame.
fn tight_view<'a>(
    bytes: &'a [u8],
    pitch: usize,
    width: usize,
    height: usize,
    scratch: &'a mut Vec<u8>,
) -> Packed422View<'a> {
    let row = width * 2;
    if pitch == row {
        Packed422View::new(&bytes[..row * height], width, height)
    } else {
        scratch.clear();
        for y in 0..height {
            let start = y * pitch;
            scratch.extend_from_slice(&bytes[start..start + row]);
        }
        Packed422View::new(scratch, width, height)
    }
}

/// Recolors motion pixels of a packed frame with the palette chroma.
fn apply_palette(frame: &mut Packed422Plane, palette: MotionPalette) {
    if palette == MotionPalette::Neutral {
        return;
    }
    let [u, v] = palette.chroma();
    for y in 0..frame.height() {
        for x in (0..frame.width()).step_by(2) {
            let a = frame.get(x, y);
            let b = frame.get(x + 1, y);
            if a[0] > 0 || b[0] > 0 {
                frame.set(x, y, [a[0], u, v]);
            }
        }
    }
}

fn run_event_loop<D: CaptureDevice + 'static>(
    device: Arc<D>,
    config: &FileConfig,
) -> Result<(), Box<dyn Error>> {
    let format = bring_up(&*device, &config.capture)?;
    let width = format.width as usize;
    let height = format.height as usize;
    let pitch = format.bytes_per_line as usize;

    let mut pipeline = DetectionPipeline::new(width, height, &config.detect);
    let mut planar = Planar444Plane::new(width, height);
    let mut display_frame = Packed422Plane::new(width, height);
    let mut row_scratch: Vec<u8> = Vec::new();
    let mut display = HeadlessDisplay::new(config.output.log_every_frames);
    let mut view = ViewMode::Live;
    let mut palette = MotionPalette::Neutral;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, shutting down");
            cancel.cancel();
        })?;
    }

    let (events_tx, events_rx) = crossbeam_channel::bounded(1);
    let worker = spawn_capture_loop(
        Arc::clone(&device),
        events_tx,
        cancel.clone(),
        config.capture.fetch_timeout(),
    );

    loop {
        match events_rx.recv() {
            Ok(CaptureEvent::Frame(index)) => {
                {
                    let bytes = device.frame(index);
                    let view_bytes = tight_view(&bytes, pitch, width, height, &mut row_scratch);
                    packed422_to_planar444(view_bytes, &mut planar);
                }
                device.release_frame(index);

                if let Some(result) = pipeline.process(&planar) {
                    if !result.bounds.is_zero() {
                        info!(
                            x = result.bounds.x,
                            y = result.bounds.y,
                            w = result.bounds.w,
                            h = result.bounds.h,
                            "motion detected"
                        );
                    }

                    match view {
                        ViewMode::Live => {
                            planar444_to_packed422(&planar, &mut display_frame);
                        }
                        ViewMode::Motion => {
                            planar444_to_packed422(pipeline.motion_image(), &mut display_frame);
                            apply_palette(&mut display_frame, palette);
                        }
                        ViewMode::Background => {
                            mean_to_packed422(pipeline.background(), &mut display_frame);
                        }
                    }
                    display.render(
                        view.title(),
                        &display_frame,
                        display_frame.pitch(),
                        result.bounds,
                    );
                }

                while let Some(event) = display.poll_event() {
                    match event {
                        UiEvent::Quit => cancel.cancel(),
                        UiEvent::CycleView => {
                            view = view.next();
                            info!(view = view.title(), "view switched");
                        }
                        UiEvent::CycleColorMap => palette = palette.toggled(),
                    }
                }
            }
            Ok(CaptureEvent::Shutdown) | Err(_) => break,
        }
    }

    let worker_result = worker.join();
    device.close();

    match worker_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("capture thread panicked".into()),
    }
}
