//! FFmpeg-backed decoding for local files and V4L2 capture devices.
//!
//! Frames are decoded in-memory and converted to packed RGB24 before they
//! leave this module.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;

use crate::display::QuitFlag;
use crate::frame::Frame;

pub(crate) struct FfmpegDecoder {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    flushed: bool,
}

impl FfmpegDecoder {
    /// Open a local file. Blocking reads are abandoned once `quit` is set.
    pub(crate) fn open_file(path: &Path, quit: QuitFlag) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input_with_interrupt(&path, move || quit.is_requested())
            .with_context(|| format!("failed to open '{}' with ffmpeg", path.display()))?;
        Self::from_input(input)
    }

    /// Open a V4L2 device node such as `/dev/video0`.
    ///
    /// libavformat picks the v4l2 demuxer from the `/dev/video` prefix once
    /// devices are registered. A stalled camera is interrupted through `quit`.
    pub(crate) fn open_device(device: &Path, quit: QuitFlag) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        ffmpeg::device::register_all();
        if !ffmpeg::device::input::video().any(|format| format.name().contains("v4l2")) {
            return Err(anyhow!("ffmpeg was built without v4l2 capture support"));
        }
        let input = ffmpeg::format::input_with_interrupt(&device, move || quit.is_requested())
            .with_context(|| format!("failed to open capture device {}", device.display()))?;
        Self::from_input(input)
    }

    fn from_input(input: ffmpeg::format::context::Input) -> Result<Self> {
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("input has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            flushed: false,
        })
    }

    pub(crate) fn frames_decoded(&self) -> u64 {
        self.frame_count
    }

    /// Decode the next frame. `Ok(None)` once the input and decoder are drained.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
            if self.flushed {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.flushed = true;
                }
                Err(err) => return Err(anyhow!(err).context("read packet from input")),
            }
        }
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = packed_rgb(&rgb_frame)?;
        self.frame_count += 1;
        Frame::from_rgb(width, height, pixels, self.frame_count).map(Some)
    }
}

/// Copy an RGB24 frame into a tightly packed buffer, dropping row padding.
fn packed_rgb(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
