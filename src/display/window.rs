//! Desktop window sink backed by OpenCV highgui.

use anyhow::{anyhow, Context, Result};
use opencv::{core, highgui, prelude::*};

use super::{is_quit_key, DisplaySink, QuitFlag};
use crate::frame::Frame;

/// Shows annotated frames in a native window. `q` or ESC in the window,
/// or closing it, requests a quit.
pub struct WindowDisplay {
    title: String,
    quit: QuitFlag,
    shown: bool,
}

impl WindowDisplay {
    pub fn open(title: &str, quit: QuitFlag) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("failed to open display window '{}'", title))?;
        Ok(Self {
            title: title.to_string(),
            quit,
            shown: false,
        })
    }

    fn window_closed(&self) -> bool {
        self.shown
            && highgui::get_window_property(&self.title, highgui::WND_PROP_VISIBLE)
                .map(|visible| visible < 1.0)
                .unwrap_or(true)
    }
}

/// Copy packed RGB into a BGR `Mat`, the channel order highgui expects.
fn to_bgr_mat(frame: &Frame) -> Result<Mat> {
    let image = frame.image();
    let rows = i32::try_from(image.height()).context("frame too tall for display")?;
    let cols = i32::try_from(image.width()).context("frame too wide for display")?;
    let mut mat = Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC3, core::Scalar::all(0.0))
        .context("allocate display buffer")?;
    let dst = mat.data_bytes_mut().context("display buffer is not continuous")?;
    if dst.len() != image.as_raw().len() {
        return Err(anyhow!(
            "display buffer holds {} bytes, frame has {}",
            dst.len(),
            image.as_raw().len()
        ));
    }
    for (out, rgb) in dst.chunks_exact_mut(3).zip(image.as_raw().chunks_exact(3)) {
        out[0] = rgb[2];
        out[1] = rgb[1];
        out[2] = rgb[0];
    }
    Ok(mat)
}

impl DisplaySink for WindowDisplay {
    fn name(&self) -> &'static str {
        "window"
    }

    fn present(&mut self, frame: &Frame) -> Result<()> {
        let mat = to_bgr_mat(frame)?;
        highgui::imshow(&self.title, &mat).context("failed to show frame")?;
        self.shown = true;
        let key = highgui::wait_key(1).context("failed to poll window keys")?;
        if is_quit_key(key) {
            log::info!("quit key pressed in display window");
            self.quit.request();
        }
        Ok(())
    }

    fn poll_quit_requested(&mut self) -> bool {
        if !self.quit.is_requested() && self.window_closed() {
            log::info!("display window closed");
            self.quit.request();
        }
        self.quit.is_requested()
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_window(&self.title).context("failed to close display window")?;
        Ok(())
    }
}
