//! demo - end-to-end synthetic run of the Ambulance Priority Monitor
//!
//! Feeds generated frames through a scripted detector that "sees" an
//! ambulance periodically, with a short dwell so the signal can be watched
//! switching to emergency and back. Needs no model or camera.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use ambulance_priority::config::{dwell_from_secs, OverlaySettings, SyntheticSettings};
use ambulance_priority::{
    open_display, quit_hint, BoundingBox, DetectionFilter, FrameSource, OverlayRenderer,
    QuitFlag, RawDetection, ScriptedBackend, SignalController, Statistics, StreamLoop,
    SyntheticSource,
};

const DEMO_WIDTH: u32 = 640;
const DEMO_HEIGHT: u32 = 480;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to process.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// An ambulance passes every N frames.
    #[arg(long, default_value_t = 40)]
    every: u64,
    /// Frames each pass stays in view.
    #[arg(long, default_value_t = 10)]
    visible: u64,
    /// Emergency dwell in seconds.
    #[arg(long, default_value_t = 0.5)]
    dwell_secs: f64,
    /// Delay between frames in milliseconds.
    #[arg(long, default_value_t = 20)]
    frame_delay_ms: u64,
    /// Write annotated frames to this .jpg/.png file.
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Watch the run in a desktop window; q quits (needs display-window).
    #[arg(long)]
    window: bool,
}

/// Paces the synthetic source so the reset timer has time to fire.
struct Paced {
    inner: SyntheticSource,
    delay: Duration,
}

impl FrameSource for Paced {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn next_frame(&mut self) -> Result<Option<ambulance_priority::Frame>> {
        std::thread::sleep(self.delay);
        self.inner.next_frame()
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn stats(&self) -> ambulance_priority::SourceStats {
        self.inner.stats()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.every == 0 {
        return Err(anyhow!("--every must be >= 1"));
    }

    let script = build_script(&args);
    let dwell = dwell_from_secs(args.dwell_secs)?;

    let mut source = Paced {
        inner: SyntheticSource::new(
            "demo",
            SyntheticSettings {
                frames: args.frames,
                width: DEMO_WIDTH,
                height: DEMO_HEIGHT,
            },
        ),
        delay: Duration::from_millis(args.frame_delay_ms),
    };
    source.connect()?;

    let quit = QuitFlag::new();
    quit.install_ctrlc_handler()?;
    let overlay = OverlaySettings {
        preview_path: args.preview.clone(),
        show_window: args.window,
        ..OverlaySettings::default()
    };
    let display = open_display(&overlay, quit.clone())?;

    let stats = Statistics::shared(30);
    let controller = SignalController::new(dwell, stats);
    let renderer = OverlayRenderer::new(&overlay)?;
    let mut stream = StreamLoop::new(
        Box::new(source),
        Box::new(ScriptedBackend::new(script)),
        DetectionFilter::new("ambulance", 0.7),
        controller,
        renderer,
        display,
    );

    log::info!("demo initialized; {}", quit_hint(args.window));
    let report = stream.run();
    let summary = stream
        .statistics()
        .lock()
        .map_err(|_| anyhow!("statistics lock poisoned"))?
        .snapshot();

    println!("Demo complete.");
    println!("- Phase: {:?}", report.phase);
    println!(
        "- Frames: {} processed, {} skipped",
        report.frames_processed, report.frames_skipped
    );
    println!("- Ambulance detections: {}", summary.total_detections);
    println!("- Signal changes: {}", summary.signal_changes);
    println!("- Average FPS: {:.1}", summary.average_fps);
    if let Some(path) = &args.preview {
        println!("- Last annotated frame: {}", path.display());
    }
    Ok(())
}

/// Per-frame detections: an ambulance driving left to right during each pass,
/// plus a car and a low-confidence ambulance the filter must drop.
fn build_script(args: &Args) -> Vec<Vec<RawDetection>> {
    (0..args.frames)
        .map(|i| {
            let mut detections = vec![RawDetection::new(
                "car",
                0.95,
                BoundingBox::new(40, 300, 160, 380),
            )];
            let phase = i % args.every;
            if phase < args.visible {
                let x = 60 + (phase as i32) * 30;
                detections.push(RawDetection::new(
                    "ambulance",
                    0.91,
                    BoundingBox::new(x, 180, x + 180, 300),
                ));
            } else if phase == args.visible {
                detections.push(RawDetection::new(
                    "ambulance",
                    0.42,
                    BoundingBox::new(500, 200, 600, 260),
                ));
            }
            detections
        })
        .collect()
}
