//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream to packed RGB24. Rotation and frame-index
//! reconstruction are left to the `FrameSource` façade; this backend only reports
//! raw presentation timestamps and the stream's rotation hints.

use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::normalize::{display_matrix_rotation, parse_display_matrix, resolve_rotation, TimeBase};
use super::synthetic::RawUnit;
use crate::error::{MillError, Result};
use crate::frame::VideoMetadata;

/// Container-level seeks are expressed in microseconds.
const AV_TIME_BASE_US: f64 = 1_000_000.0;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: TimeBase,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    metadata: VideoMetadata,
    eof_sent: bool,
    units_decoded: u64,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().map_err(|e| MillError::open(path, format!("initialize ffmpeg: {e}")))?;
        let input = ffmpeg::format::input(&path).map_err(|e| MillError::open(path, e))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| MillError::open(path, "file has no video track"))?;
        let stream_index = stream.index();
        let tb = stream.time_base();
        let time_base = TimeBase::new(tb.numerator(), tb.denominator());

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            f64::from(rate)
        } else {
            0.0
        };
        let frame_count = u64::try_from(stream.frames()).ok().filter(|n| *n > 0);

        let rotate_tag = stream.metadata().get("rotate").map(str::to_owned);
        let display_matrix = stream
            .side_data()
            .filter(|side| side.kind() == ffmpeg::codec::packet::side_data::Type::DisplayMatrix)
            .find_map(|side| parse_display_matrix(side.data()))
            .and_then(|matrix| display_matrix_rotation(&matrix));
        let rotation = resolve_rotation(rotate_tag.as_deref(), display_matrix);

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| MillError::open(path, format!("load video decoder parameters: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| MillError::open(path, format!("open video decoder: {e}")))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| MillError::open(path, format!("create scaler: {e}")))?;

        let (width, height) = rotation.apply_to_dims(decoder.width(), decoder.height());
        let metadata = VideoMetadata {
            width,
            height,
            fps,
            frame_count,
            rotation,
        };

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            metadata,
            eof_sent: false,
            units_decoded: 0,
        })
    }

    pub(crate) fn metadata(&self) -> VideoMetadata {
        self.metadata.clone()
    }

    pub(crate) fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Backward seek to the nearest keyframe at or before `target_pts` (stream ticks).
    pub(crate) fn seek(&mut self, target_pts: i64) -> Result<()> {
        let seconds = self.time_base.seconds(target_pts.max(0));
        let target_us = (seconds * AV_TIME_BASE_US) as i64;
        self.input
            .seek(target_us, ..target_us.saturating_add(1))
            .map_err(|e| MillError::decode(self.units_decoded, format!("seek in {}: {e}", self.path)))?;
        self.decoder.flush();
        self.eof_sent = false;
        Ok(())
    }

    pub(crate) fn next_unit(&mut self) -> Result<Option<RawUnit>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let unit = self.convert(&decoded)?;
                    self.units_decoded += 1;
                    return Ok(Some(unit));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => return Err(MillError::decode(self.units_decoded, e)),
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .map_err(|e| MillError::decode(self.units_decoded, e))?;
                fed = true;
                break;
            }
            if !fed {
                self.decoder
                    .send_eof()
                    .map_err(|e| MillError::decode(self.units_decoded, e))?;
                self.eof_sent = true;
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RawUnit> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| MillError::decode(self.units_decoded, format!("scale frame to RGB: {e}")))?;
        let image = frame_to_image(&rgb_frame)
            .ok_or_else(|| MillError::decode(self.units_decoded, "RGB frame row is out of bounds"))?;
        Ok(RawUnit {
            pts: decoded.timestamp().or_else(|| decoded.pts()),
            image,
        })
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Option<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return RgbImage::from_raw(width, height, data.get(..row_bytes * height as usize)?.to_vec());
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes)?);
    }
    RgbImage::from_raw(width, height, pixels)
}
