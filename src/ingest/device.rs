//! Live capture device source. Index `N` maps to `/dev/videoN`.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

#[cfg(feature = "ingest-ffmpeg")]
use super::ffmpeg::FfmpegDecoder;
use super::{FrameSource, SourceStats};
use crate::display::QuitFlag;
use crate::frame::Frame;

pub struct DeviceSource {
    index: u32,
    device: PathBuf,
    #[cfg(feature = "ingest-ffmpeg")]
    quit: QuitFlag,
    #[cfg(feature = "ingest-ffmpeg")]
    decoder: Option<FfmpegDecoder>,
    frames_captured: u64,
}

impl DeviceSource {
    pub fn new(index: u32, quit: QuitFlag) -> Result<Self> {
        let device = PathBuf::from(format!("/dev/video{}", index));
        #[cfg(not(feature = "ingest-ffmpeg"))]
        {
            drop(quit);
            Err(anyhow!(
                "capture device {} requires the ingest-ffmpeg feature",
                device.display()
            ))
        }
        #[cfg(feature = "ingest-ffmpeg")]
        {
            if !device.exists() {
                return Err(anyhow!("capture device {} does not exist", device.display()));
            }
            Ok(Self {
                index,
                device,
                quit,
                decoder: None,
                frames_captured: 0,
            })
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl FrameSource for DeviceSource {
    fn describe(&self) -> String {
        format!("device {} ({})", self.index, self.device.display())
    }

    #[cfg(feature = "ingest-ffmpeg")]
    fn connect(&mut self) -> Result<()> {
        self.decoder = Some(FfmpegDecoder::open_device(&self.device, self.quit.clone())?);
        log::info!("DeviceSource: connected to {}", self.device.display());
        Ok(())
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    fn connect(&mut self) -> Result<()> {
        Err(anyhow!("device capture requires the ingest-ffmpeg feature"))
    }

    #[cfg(feature = "ingest-ffmpeg")]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| anyhow!("{} is not connected", self.device.display()))?;
        let frame = decoder.next_frame()?;
        self.frames_captured = decoder.frames_decoded();
        Ok(frame)
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("device capture requires the ingest-ffmpeg feature"))
    }

    fn close(&mut self) {
        #[cfg(feature = "ingest-ffmpeg")]
        {
            self.decoder = None;
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            identifier: self.describe(),
        }
    }
}
