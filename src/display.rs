//! Display sinks and the cooperative quit signal.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::OverlaySettings;
use crate::error::StartupError;
use crate::frame::Frame;

#[cfg(feature = "display-window")]
mod window;
#[cfg(feature = "display-window")]
pub use window::WindowDisplay;

pub const WINDOW_TITLE: &str = "Ambulance Priority Monitor";

const KEY_ESCAPE: i32 = 27;

/// Cooperative stop request shared between the Ctrl-C handler, display sinks
/// and the stream loop.
#[derive(Clone, Debug, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this flag.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown signal received");
            flag.request();
        })
        .context("error setting Ctrl-C handler")
    }
}

/// Where annotated frames go.
pub trait DisplaySink: Send {
    fn name(&self) -> &'static str;

    /// Show one annotated frame.
    fn present(&mut self, frame: &Frame) -> Result<()>;

    /// Non-blocking check for a user quit request.
    fn poll_quit_requested(&mut self) -> bool;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards frames. Quit comes from the shared flag only.
pub struct HeadlessDisplay {
    quit: QuitFlag,
    frames_presented: u64,
}

impl HeadlessDisplay {
    pub fn new(quit: QuitFlag) -> Self {
        Self {
            quit,
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl DisplaySink for HeadlessDisplay {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn present(&mut self, _frame: &Frame) -> Result<()> {
        self.frames_presented += 1;
        Ok(())
    }

    fn poll_quit_requested(&mut self) -> bool {
        self.quit.is_requested()
    }
}

/// Keeps the latest annotated frame in a single image file.
///
/// The file is written next to its final name and renamed into place so a
/// viewer polling it never sees a half-written image.
pub struct PreviewDisplay {
    path: PathBuf,
    staging: PathBuf,
    quit: QuitFlag,
}

impl PreviewDisplay {
    pub fn new(path: impl Into<PathBuf>, quit: QuitFlag) -> Result<Self> {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        if !matches!(extension.as_deref(), Some("jpg" | "jpeg" | "png")) {
            anyhow::bail!(
                "preview path {} must end in .jpg, .jpeg or .png",
                path.display()
            );
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                anyhow::bail!("preview directory {} does not exist", parent.display());
            }
        }
        let staging = staging_path(&path);
        Ok(Self {
            path,
            staging,
            quit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    name.push(".partial.");
    if let Some(ext) = path.extension() {
        name.push(ext);
    }
    path.with_file_name(name)
}

impl DisplaySink for PreviewDisplay {
    fn name(&self) -> &'static str {
        "preview"
    }

    fn present(&mut self, frame: &Frame) -> Result<()> {
        frame
            .image()
            .save(&self.staging)
            .with_context(|| format!("failed to write preview {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("failed to move preview into {}", self.path.display()))?;
        Ok(())
    }

    fn poll_quit_requested(&mut self) -> bool {
        self.quit.is_requested()
    }

    fn close(&mut self) -> Result<()> {
        if self.staging.exists() {
            std::fs::remove_file(&self.staging).ok();
        }
        Ok(())
    }
}

/// True for the keys that stop the monitor from a display window.
pub fn is_quit_key(key: i32) -> bool {
    if key < 0 {
        return false;
    }
    let key = key & 0xff;
    key == KEY_ESCAPE || key == i32::from(b'q') || key == i32::from(b'Q')
}

/// How to stop the monitor, for the startup banner.
pub fn quit_hint(window: bool) -> &'static str {
    if window {
        "press Ctrl-C (or q in the window) to quit"
    } else {
        "press Ctrl-C to quit"
    }
}

/// Pick the sink for `settings`: a window when asked for, then a preview
/// file, otherwise headless. Unusable settings are configuration errors.
pub fn open_display(settings: &OverlaySettings, quit: QuitFlag) -> Result<Box<dyn DisplaySink>> {
    if settings.show_window {
        if settings.preview_path.is_some() {
            log::warn!("preview path ignored while the display window is enabled");
        }
        return open_window(quit);
    }
    match &settings.preview_path {
        Some(path) => {
            let display = PreviewDisplay::new(path, quit)
                .map_err(|e| StartupError::configuration(format!("{:#}", e)))?;
            log::info!("preview frames written to {}", display.path().display());
            Ok(Box::new(display))
        }
        None => Ok(Box::new(HeadlessDisplay::new(quit))),
    }
}

#[cfg(feature = "display-window")]
fn open_window(quit: QuitFlag) -> Result<Box<dyn DisplaySink>> {
    let display = WindowDisplay::open(WINDOW_TITLE, quit)
        .map_err(|e| StartupError::configuration(format!("{:#}", e)))?;
    Ok(Box::new(display))
}

#[cfg(not(feature = "display-window"))]
fn open_window(_quit: QuitFlag) -> Result<Box<dyn DisplaySink>> {
    Err(StartupError::configuration(
        "a display window requires the display-window feature",
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_flag_is_shared_between_clones() {
        let flag = QuitFlag::new();
        let mut display = HeadlessDisplay::new(flag.clone());
        assert!(!display.poll_quit_requested());
        flag.request();
        assert!(display.poll_quit_requested());
    }

    #[test]
    fn headless_counts_presented_frames() {
        let mut display = HeadlessDisplay::new(QuitFlag::new());
        let frame = Frame::filled(4, 4, [0, 0, 0], 1);
        display.present(&frame).unwrap();
        display.present(&frame).unwrap();
        assert_eq!(display.frames_presented(), 2);
    }

    #[test]
    fn preview_overwrites_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.png");
        let mut display = PreviewDisplay::new(&path, QuitFlag::new()).unwrap();
        display.present(&Frame::filled(8, 6, [10, 20, 30], 1)).unwrap();
        display.present(&Frame::filled(8, 6, [40, 50, 60], 2)).unwrap();
        display.close().unwrap();

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(0, 0).0, [40, 50, 60]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn preview_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PreviewDisplay::new(dir.path().join("live.bmp"), QuitFlag::new()).is_err());
    }

    #[test]
    fn quit_keys_are_q_and_escape() {
        assert!(is_quit_key(i32::from(b'q')));
        assert!(is_quit_key(i32::from(b'Q')));
        assert!(is_quit_key(27));
        // Some highgui backends report modifier bits above the low byte.
        assert!(is_quit_key(0x10_0000 | i32::from(b'q')));
        assert!(!is_quit_key(-1));
        assert!(!is_quit_key(i32::from(b'p')));
    }

    #[test]
    fn quit_hint_mentions_window_key_only_with_a_window() {
        assert_eq!(quit_hint(false), "press Ctrl-C to quit");
        assert!(quit_hint(true).contains("q in the window"));
    }

    #[test]
    fn open_display_prefers_preview_over_headless() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = OverlaySettings::default();
        assert_eq!(open_display(&settings, QuitFlag::new()).unwrap().name(), "headless");

        settings.preview_path = Some(dir.path().join("live.jpg"));
        assert_eq!(open_display(&settings, QuitFlag::new()).unwrap().name(), "preview");
    }

    #[test]
    fn bad_preview_path_is_a_configuration_error() {
        let settings = OverlaySettings {
            preview_path: Some("/no/such/dir/live.jpg".into()),
            ..OverlaySettings::default()
        };
        let err = open_display(&settings, QuitFlag::new()).err().unwrap();
        assert_eq!(crate::error::exit_code_for(&err), 2);
    }

    #[cfg(not(feature = "display-window"))]
    #[test]
    fn window_without_feature_is_a_configuration_error() {
        let settings = OverlaySettings {
            show_window: true,
            ..OverlaySettings::default()
        };
        let err = open_display(&settings, QuitFlag::new()).err().unwrap();
        assert!(err.to_string().contains("display-window feature"));
        assert_eq!(crate::error::exit_code_for(&err), 2);
    }
}
