use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// This is the boundary to the object-detection model. Everything behind it
/// (tensors, letterboxing, class tables) stays inside the implementation;
/// callers only ever see plain `RawDetection` records.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the frame as read-only. A failure here is a
    /// per-frame error: the caller skips the frame and keeps running.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once before the stream loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
