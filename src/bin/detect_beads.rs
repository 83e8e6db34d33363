//! detect_beads - run bead detection over a video into a resumable JSONL log
//!
//! 1. Loads the detection config (file, `MILL_CONFIG`, env overrides)
//! 2. Opens the video and the result log (replaying any existing lines)
//! 3. Optionally applies an ROI mask
//! 4. Processes frames in order until done, `--limit`, or Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use mill_beads::{
    BeadDetector, DetectionConfig, FrameSource, JsonlResultStore, PipelineCoordinator,
    ResultStore, RoiMask,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file (or stub://beads for the built-in synthetic clip).
    #[arg(long)]
    input: String,
    /// Result log path (JSON lines).
    #[arg(long, default_value = "detections.jsonl")]
    output: PathBuf,
    /// Detection config (JSON, or TOML by extension).
    #[arg(long, env = "MILL_CONFIG")]
    config: Option<PathBuf>,
    /// Region-of-interest mask image, same size as the rotated frames.
    #[arg(long)]
    roi: Option<PathBuf>,
    /// Maximum number of frames to process in this run.
    #[arg(long)]
    limit: Option<u64>,
    /// Continue after the frames already stored contiguously from frame 0.
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,
    /// Delete the existing result log before running.
    #[arg(long)]
    fresh: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let config = DetectionConfig::load(args.config.as_deref()).context("loading config")?;
    let detector = BeadDetector::new(&config);

    let source = {
        let _stage = ui.stage("Open video");
        FrameSource::open(&args.input)?
    };
    let mut store = {
        let _stage = ui.stage("Open result log");
        JsonlResultStore::open(&args.output)
            .with_context(|| format!("opening result log {}", args.output.display()))?
    };
    if args.fresh {
        store.clear()?;
    }
    let start_frame = if args.resume {
        store.contiguous_prefix_len()
    } else {
        0
    };

    let mut pipeline = PipelineCoordinator::new(source, detector, store);
    if let Some(path) = &args.roi {
        match RoiMask::load(path) {
            Ok(mask) => pipeline.set_roi_mask(Some(mask))?,
            Err(err) => log::warn!("ignoring ROI mask: {err}"),
        }
    }

    let cancel = pipeline.cancel_handle();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping after the current frame");
        cancel.cancel();
    })
    .map_err(|e| anyhow!("failed to install Ctrl-C handler: {e}"))?;

    if start_frame > 0 {
        log::info!("resuming at frame {start_frame}");
    }
    let mut progress = ui.progress("frames");
    let mut report = |percent: f64| progress.update(percent);
    let summary = pipeline.run_from(start_frame, Some(&mut report), args.limit)?;

    let status = if summary.cancelled { "cancelled" } else { "done" };
    progress.finish(status);
    println!(
        "{}: {} frames processed this run, {} frames in {}",
        status,
        summary.frames_processed,
        pipeline.store().len(),
        args.output.display()
    );
    Ok(())
}
