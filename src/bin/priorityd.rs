//! priorityd - Ambulance Priority Monitor daemon
//!
//! This daemon:
//! 1. Resolves configuration (file, environment, flags) and validates it
//! 2. Loads the detector and opens the frame source
//! 3. Runs the per-frame loop: detect, filter, drive the signal, annotate, present
//! 4. Exits 0 on end of stream or quit, non-zero on startup or acquisition failure

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use ambulance_priority::config::dwell_from_secs;
use ambulance_priority::ui::{Ui, UiMode};
use ambulance_priority::{
    exit_code_for, load_backend, open_display, open_source, quit_hint, DetectionFilter,
    MonitorConfig, OverlayRenderer, QuitFlag, SignalController, Statistics, StreamLoop,
    StreamPhase, StreamReport,
};

/// Exit code when the stream ends because frame acquisition failed.
const EXIT_ACQUISITION_FAILED: u8 = 4;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ambulance detection driven emergency signal monitor")]
struct Args {
    /// Configuration file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "AMBULANCE_CONFIG")]
    config: Option<PathBuf>,
    /// Detector weights (.onnx) or a recorded detection script (.json).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Device index, local video file, or stub://<name>.
    #[arg(long)]
    source: Option<String>,
    /// Minimum confidence (exclusive) for a sighting.
    #[arg(long)]
    confidence: Option<f32>,
    /// Detector label treated as an ambulance.
    #[arg(long)]
    class: Option<String>,
    /// Seconds the signal stays in emergency after activation.
    #[arg(long)]
    dwell_secs: Option<f64>,
    /// Frames averaged for the FPS readout.
    #[arg(long)]
    fps_window: Option<usize>,
    /// TrueType/OpenType font for overlay text.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Write each annotated frame to this .jpg/.png file.
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Show annotated frames in a desktop window (q quits).
    #[arg(long)]
    window: bool,
    /// Startup progress output.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(report) if report.phase == StreamPhase::Error => {
            log::error!(
                "stream aborted after {} frames (frame acquisition failed)",
                report.frames_processed
            );
            ExitCode::from(EXIT_ACQUISITION_FAILED)
        }
        Ok(report) => {
            log::info!(
                "priorityd finished: frames={} skipped={} quit={}",
                report.frames_processed,
                report.frames_skipped,
                report.quit_requested
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(args: Args) -> Result<StreamReport> {
    let ui = Ui::for_stderr(args.ui);
    log::info!("priorityd {} starting", env!("CARGO_PKG_VERSION"));

    let cfg = ui.run_stage("Loading configuration", || {
        let mut cfg = MonitorConfig::resolve(args.config.as_deref())?;
        apply_args(&mut cfg, &args)?;
        cfg.validate()?;
        Ok(cfg)
    })?;
    log::info!(
        "config: model={} source={} class='{}' threshold={:.2} dwell={:.1}s fps_window={}",
        cfg.model_path.display(),
        cfg.source,
        cfg.class_filter,
        cfg.confidence_threshold,
        cfg.emergency_dwell.as_secs_f64(),
        cfg.fps_window_size
    );

    let detector = ui.run_stage("Loading detector", || {
        let mut backend = load_backend(&cfg.model_path, &cfg.detector)?;
        backend.warm_up()?;
        Ok(backend)
    })?;

    // FFmpeg polls this flag while opening the source.
    let quit = QuitFlag::new();
    quit.install_ctrlc_handler()?;

    let source = ui.run_stage("Opening source", || {
        open_source(&cfg.source, &cfg.synthetic, &quit)
    })?;

    let (renderer, display) = ui.run_stage("Opening display", || {
        let renderer = OverlayRenderer::new(&cfg.overlay)?;
        let display = open_display(&cfg.overlay, quit.clone())?;
        Ok((renderer, display))
    })?;

    let stats = Statistics::shared(cfg.fps_window_size);
    let controller = SignalController::new(cfg.emergency_dwell, stats);
    let filter = DetectionFilter::new(cfg.class_filter.clone(), cfg.confidence_threshold);

    let mut stream = StreamLoop::new(source, detector, filter, controller, renderer, display);
    log::info!(
        "priorityd initialized; {}",
        quit_hint(cfg.overlay.show_window)
    );
    let report = stream.run();

    let summary = stream
        .statistics()
        .lock()
        .map(|stats| stats.snapshot())
        .unwrap_or_default();
    log::info!(
        "totals: detections={} signal_changes={} frames={} avg_fps={:.1}",
        summary.total_detections,
        summary.signal_changes,
        summary.frames_processed,
        summary.average_fps
    );
    log::info!("shutdown complete");
    Ok(report)
}

/// Command-line flags override file and environment values.
fn apply_args(cfg: &mut MonitorConfig, args: &Args) -> Result<()> {
    if let Some(model) = &args.model {
        cfg.model_path = model.clone();
    }
    if let Some(source) = &args.source {
        cfg.source = source.clone();
    }
    if let Some(confidence) = args.confidence {
        cfg.confidence_threshold = confidence;
    }
    if let Some(class) = &args.class {
        cfg.class_filter = class.clone();
    }
    if let Some(secs) = args.dwell_secs {
        cfg.emergency_dwell = dwell_from_secs(secs)?;
    }
    if let Some(window) = args.fps_window {
        cfg.fps_window_size = window;
    }
    if let Some(font) = &args.font {
        cfg.overlay.font_path = Some(font.clone());
    }
    if let Some(preview) = &args.preview {
        cfg.overlay.preview_path = Some(preview.clone());
    }
    if args.window {
        cfg.overlay.show_window = true;
    }
    Ok(())
}
