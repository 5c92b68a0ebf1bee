//! Chessboard pose viewer
//!
//! Plays a sequence of frames, estimates the camera pose against the
//! chessboard on every frame and draws a wireframe box plus the camera
//! position on top of it.
//!
//! Usage:
//! ```bash
//! chessboard-pose --config samples/chessboard.yaml \
//!   --input frames/ --corners corners.csv --snapshot-dir output/
//! ```
//!
//! Corners come from an external detector, recorded as CSV (`frame,index,x,y`)
//! or JSON. While playing, press <enter> to pause; while paused, <enter>
//! steps one frame, `q` quits and any other input resumes.

use chessboard_pose::config::AppConfig;
use chessboard_pose::io::{ConsoleViewer, ImageSequenceSource, RecordedCorners};
use chessboard_pose::pipeline::{FrameLoop, PosePipeline};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// Camera pose estimation with an AR overlay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration (camera calibration and board)
    #[arg(short, long)]
    config: PathBuf,

    /// Frame directory or single image, overrides `input` from the config
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Recorded corner detections (.csv or .json)
    #[arg(long)]
    corners: PathBuf,

    /// Start paused
    #[arg(long)]
    paused: bool,

    /// Key-poll timeout between frames while playing, in milliseconds
    #[arg(long, default_value = "10")]
    wait_ms: u64,

    /// Debug aid: also write every shown frame as PNG into this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = AppConfig::load_from_yaml(&cli.config)?;
    let calibration = config.calibration()?;
    let target = config.target()?;
    let input = config.resolve_input(cli.input.as_deref())?;
    info!("Loaded configuration from {}", cli.config.display());
    info!("{calibration:?}");
    info!(
        "Board: {}x{} corners, cell size {}",
        target.columns(),
        target.rows(),
        target.cell_size()
    );

    let source = ImageSequenceSource::open(&input)?;
    info!("Reading {} frames from {}", source.len(), input.display());
    let detector = RecordedCorners::load(&cli.corners)?;

    let mut viewer = ConsoleViewer::stdin();
    if let Some(dir) = &cli.snapshot_dir {
        viewer = viewer.with_snapshot_dir(dir);
    }

    let pipeline = PosePipeline::new(calibration, target);
    let mut frame_loop = FrameLoop::new(pipeline, source, detector, viewer)
        .with_wait(Duration::from_millis(cli.wait_ms));
    if cli.paused {
        frame_loop = frame_loop.start_paused();
    }

    let summary = frame_loop.run()?;
    println!(
        "Frames: {}, rendered: {}, skipped: {}",
        summary.frames, summary.rendered, summary.skipped
    );
    Ok(())
}
