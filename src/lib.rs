//! Ambulance Priority Monitor
//!
//! This crate implements a single-stream monitoring loop that watches a video
//! feed for ambulances and switches a (simulated) traffic signal into an
//! emergency phase when one is seen.
//!
//! # Architecture
//!
//! Every frame goes through the same pipeline, one frame at a time:
//!
//! 1. **Acquire**: a [`FrameSource`] yields the next frame or end of stream.
//! 2. **Detect**: a [`DetectorBackend`] reports raw labelled boxes.
//! 3. **Filter**: [`DetectionFilter`] keeps boxes of the configured class
//!    whose confidence is strictly above the threshold.
//! 4. **Control**: [`SignalController`] moves `Normal → Emergency` on the
//!    first sighting and arms a single reset timer; sightings during an
//!    emergency never extend it.
//! 5. **Render**: [`OverlayRenderer`] draws boxes, a status panel and a
//!    smoothed FPS readout.
//! 6. **Present**: a [`DisplaySink`] shows the frame and reports quit
//!    requests.
//!
//! # Module Structure
//!
//! - `config`: layered configuration (file, environment, CLI) and validation
//! - `detect`: detector backends and the class/confidence filter
//! - `signal`: emergency state machine and reset timer
//! - `stats`: counters and the rolling FPS window
//! - `overlay`: frame annotation
//! - `ingest`: frame sources (devices, files, synthetic)
//! - `display`: display sinks (headless, preview file, optional window) and the quit flag
//! - `stream`: the per-frame loop

pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod signal;
pub mod stats;
pub mod stream;
pub mod ui;

pub use config::{DetectorSettings, MonitorConfig, OverlaySettings, SyntheticSettings};
pub use detect::{
    filter_detections, load_backend, AmbulanceSighting, BoundingBox, DetectionFilter,
    DetectorBackend, RawDetection, ScriptedBackend,
};
pub use display::{
    open_display, quit_hint, DisplaySink, HeadlessDisplay, PreviewDisplay, QuitFlag,
};
#[cfg(feature = "display-window")]
pub use display::WindowDisplay;
pub use error::{exit_code_for, StartupError, StartupErrorKind};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceSpec, SourceStats, SyntheticSource};
pub use overlay::OverlayRenderer;
pub use signal::{SignalController, SignalLight, SignalSnapshot, SignalState, Transition};
pub use stats::{SharedStatistics, Statistics, StatsSnapshot};
pub use stream::{StreamLoop, StreamPhase, StreamReport};
