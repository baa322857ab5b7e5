//! Synthetic frame source (`stub://`).
//!
//! Produces a fixed number of generated frames and then reports end of
//! stream. Used by the demo binary and tests, and handy for exercising the
//! loop without a camera.

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::config::SyntheticSettings;
use crate::frame::Frame;

pub struct SyntheticSource {
    name: String,
    settings: SyntheticSettings,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, settings: SyntheticSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            frame_count: 0,
            connected: false,
        }
    }

    /// Road-like background with a block that drifts across the frame.
    fn generate(&self) -> RgbImage {
        let width = self.settings.width.max(1);
        let height = self.settings.height.max(1);
        let block = (width / 8).max(1);
        let block_x = ((self.frame_count * 4) % width as u64) as u32;
        let block_top = height / 2;
        RgbImage::from_fn(width, height, |x, y| {
            let in_block = x >= block_x
                && x < block_x + block
                && y >= block_top
                && y < block_top + block.min(height - block_top);
            if in_block {
                Rgb([230, 230, 230])
            } else {
                let shade = 60 + ((y * 60) / height) as u8;
                Rgb([shade, shade, shade + 10])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to stub://{} ({} frames, {}x{})",
            self.name,
            self.settings.frames,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            anyhow::bail!("synthetic source stub://{} is not connected", self.name);
        }
        if self.frame_count >= self.settings.frames {
            return Ok(None);
        }
        let image = self.generate();
        self.frame_count += 1;
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            identifier: self.describe(),
        }
    }
}
