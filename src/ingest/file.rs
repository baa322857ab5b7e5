//! Local video file source.
//!
//! Decoding happens in-memory; frames are never written back to disk.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-ffmpeg")]
use super::ffmpeg::FfmpegDecoder;
use super::{FrameSource, SourceStats};
use crate::display::QuitFlag;
use crate::frame::Frame;

pub struct FileSource {
    path: PathBuf,
    #[cfg(feature = "ingest-ffmpeg")]
    quit: QuitFlag,
    #[cfg(feature = "ingest-ffmpeg")]
    decoder: Option<FfmpegDecoder>,
    frames_captured: u64,
}

impl FileSource {
    pub fn new(path: &Path, quit: QuitFlag) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(anyhow!("video file path is empty"));
        }
        if !path.is_file() {
            return Err(anyhow!("video file {} does not exist", path.display()));
        }
        #[cfg(not(feature = "ingest-ffmpeg"))]
        {
            drop(quit);
            Err(anyhow!(
                "file ingestion requires the ingest-ffmpeg feature"
            ))
        }
        #[cfg(feature = "ingest-ffmpeg")]
        {
            Ok(Self {
                path: path.to_path_buf(),
                quit,
                decoder: None,
                frames_captured: 0,
            })
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(feature = "ingest-ffmpeg")]
    fn connect(&mut self) -> Result<()> {
        self.decoder = Some(FfmpegDecoder::open_file(&self.path, self.quit.clone())?);
        log::info!("FileSource: connected to {} (ffmpeg)", self.path.display());
        Ok(())
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    fn connect(&mut self) -> Result<()> {
        Err(anyhow!("file ingestion requires the ingest-ffmpeg feature"))
    }

    #[cfg(feature = "ingest-ffmpeg")]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| anyhow!("file source {} is not connected", self.path.display()))?;
        let frame = decoder.next_frame()?;
        self.frames_captured = decoder.frames_decoded();
        Ok(frame)
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("file ingestion requires the ingest-ffmpeg feature"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_file() {
        let err = FileSource::new(Path::new("/no/such/clip.mp4"), QuitFlag::new()).err().unwrap();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSource::new(dir.path(), QuitFlag::new()).is_err());
    }
}
