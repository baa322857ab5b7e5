//! Frame ingestion sources.
//!
//! This module provides the sources the monitor can read from:
//! - Local video files (feature: ingest-ffmpeg)
//! - Live capture devices by index, `/dev/videoN` (feature: ingest-ffmpeg)
//! - Synthetic `stub://` source (tests, demo)
//!
//! Every source follows the same lifecycle: `connect`, repeated `next_frame`
//! until it returns `Ok(None)` (end of stream) or an error, then `close`.
//! Remote URL schemes are rejected; only local media is ingested.

mod device;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod ffmpeg;
mod file;
mod synthetic;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::SyntheticSettings;
use crate::display::QuitFlag;
use crate::error::StartupError;
use crate::frame::Frame;

pub use device::DeviceSource;
pub use file::FileSource;
pub use synthetic::SyntheticSource;

/// Frame source boundary.
pub trait FrameSource {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Next decoded frame; `Ok(None)` signals a clean end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the stream. Called once when the loop exits.
    fn close(&mut self) {}

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub identifier: String,
}

/// Parsed form of a source identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Live capture device index (`0` is the default camera).
    Device(u32),
    /// Local video file.
    File(PathBuf),
    /// Synthetic frames, `stub://<name>`.
    Synthetic(String),
}

impl SourceSpec {
    pub fn parse(identifier: &str) -> Result<Self> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(StartupError::source_open("source identifier is empty").into());
        }
        if let Some(name) = identifier.strip_prefix("stub://") {
            return Ok(SourceSpec::Synthetic(name.to_string()));
        }
        if identifier.contains("://") {
            return Err(StartupError::source_open(format!(
                "unsupported source '{}': only device indexes, local files and stub:// are accepted",
                identifier
            ))
            .into());
        }
        if identifier.chars().all(|c| c.is_ascii_digit()) {
            let index = identifier.parse().map_err(|_| {
                StartupError::source_open(format!("device index '{}' is out of range", identifier))
            })?;
            return Ok(SourceSpec::Device(index));
        }
        Ok(SourceSpec::File(PathBuf::from(identifier)))
    }
}

/// Build and connect the source named by `identifier`.
///
/// Blocking reads on device and file sources are abandoned once `quit` is
/// set. Any failure is reported as a source-open error.
pub fn open_source(
    identifier: &str,
    synthetic: &SyntheticSettings,
    quit: &QuitFlag,
) -> Result<Box<dyn FrameSource>> {
    let spec = SourceSpec::parse(identifier)?;
    let mut source: Box<dyn FrameSource> = match spec {
        SourceSpec::Synthetic(name) => Box::new(SyntheticSource::new(name, synthetic.clone())),
        SourceSpec::Device(index) => Box::new(DeviceSource::new(index, quit.clone()).map_err(|e| {
            StartupError::source_open(format!("failed to open device {}: {:#}", index, e))
        })?),
        SourceSpec::File(path) => Box::new(FileSource::new(&path, quit.clone()).map_err(|e| {
            StartupError::source_open(format!(
                "failed to open video source {}: {:#}",
                path.display(),
                e
            ))
        })?),
    };
    source.connect().map_err(|e| {
        StartupError::source_open(format!(
            "failed to connect to {}: {:#}",
            source.describe(),
            e
        ))
    })?;
    Ok(source)
}
