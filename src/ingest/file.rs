//! Seekable, rotation-normalized frame source.
//!
//! `FrameSource` owns the decoder handle exclusively. Decoded units flow through
//! one normalization path regardless of backend:
//! - the frame index is rebuilt from each unit's presentation timestamp,
//! - units before the requested start frame are discarded (keyframe pre-roll),
//! - the raster is rotated by the stream's discrete rotation.
//!
//! `close()` is idempotent and `Drop` releases the decoder on every exit path.

use std::path::Path;

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::normalize::{frame_index_from_pts, TimeBase};
use super::synthetic::{RawUnit, SyntheticSource, SyntheticVideo};
use crate::error::{MillError, Result};
use crate::frame::{rotate_frame, DecodedFrame, VideoMetadata};

const STUB_SCHEME: &str = "stub://";

/// Frame source over a local video file or a synthetic video.
pub struct FrameSource {
    path: String,
    metadata: VideoMetadata,
    backend: Option<Backend>,
}

enum Backend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(Box<FfmpegFileSource>),
}

impl Backend {
    fn time_base(&self) -> TimeBase {
        match self {
            Backend::Synthetic(source) => source.time_base(),
            #[cfg(feature = "ingest-ffmpeg")]
            Backend::Ffmpeg(source) => source.time_base(),
        }
    }

    fn seek(&mut self, target_pts: i64) -> Result<()> {
        match self {
            Backend::Synthetic(source) => {
                source.seek(target_pts);
                Ok(())
            }
            #[cfg(feature = "ingest-ffmpeg")]
            Backend::Ffmpeg(source) => source.seek(target_pts),
        }
    }

    fn next_unit(&mut self) -> Result<Option<RawUnit>> {
        match self {
            Backend::Synthetic(source) => source.next_unit(),
            #[cfg(feature = "ingest-ffmpeg")]
            Backend::Ffmpeg(source) => source.next_unit(),
        }
    }
}

impl FrameSource {
    /// Open a local video file, or a `stub://` synthetic video.
    ///
    /// Missing files, unreadable containers and files without a video stream
    /// fail with `MillError::Open`.
    pub fn open(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(MillError::open(path, "empty path"));
        }
        if let Some(name) = path.strip_prefix(STUB_SCHEME) {
            let video = match name {
                "beads" | "" => SyntheticVideo::beads(),
                other => return Err(MillError::open(path, format!("unknown synthetic video '{other}'"))),
            };
            let mut source = Self::synthetic(video);
            source.path = path.to_string();
            return Ok(source);
        }
        if path.contains("://") {
            return Err(MillError::open(path, "only local paths are supported"));
        }
        if !Path::new(path).is_file() {
            return Err(MillError::open(path, "file not found"));
        }
        Self::open_file(path)
    }

    #[cfg(feature = "ingest-ffmpeg")]
    fn open_file(path: &str) -> Result<Self> {
        let source = FfmpegFileSource::open(path)?;
        let metadata = source.metadata();
        log::info!(
            "opened video {}: {}x{} (rotated {}°), fps={:.3}, frames={:?}",
            path,
            metadata.width,
            metadata.height,
            metadata.rotation.degrees(),
            metadata.fps,
            metadata.frame_count
        );
        Ok(Self {
            path: path.to_string(),
            metadata,
            backend: Some(Backend::Ffmpeg(Box::new(source))),
        })
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    fn open_file(path: &str) -> Result<Self> {
        Err(MillError::open(
            path,
            "video decoding requires the ingest-ffmpeg feature",
        ))
    }

    /// Wrap a programmatic synthetic video.
    pub fn synthetic(video: SyntheticVideo) -> Self {
        let source = SyntheticSource::new(video);
        Self {
            path: format!("{STUB_SCHEME}synthetic"),
            metadata: source.metadata(),
            backend: Some(Backend::Synthetic(source)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Backward seek to the nearest synchronization point before `frame_index`.
    pub fn seek(&mut self, frame_index: u64) -> Result<()> {
        let fps = self.metadata.fps;
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| MillError::decode(frame_index, "source is closed"))?;
        let time_base = backend.time_base();
        let target_pts = if fps > 0.0 {
            time_base.ticks(frame_index as f64 / fps)
        } else {
            0
        };
        backend.seek(target_pts)
    }

    /// Lazily iterate `(index, frame)` from `start_frame` to the end of the stream.
    ///
    /// Always seeks first, so calling this again restarts iteration. The iterator
    /// stops after the first error.
    pub fn iter_frames(&mut self, start_frame: u64) -> Frames<'_> {
        let pending_error = self.seek(start_frame).err();
        Frames {
            source: self,
            start_frame,
            next_fallback: start_frame,
            pending_error,
            done: false,
        }
    }

    /// Release the decoder. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            log::debug!("closed video {}", self.path);
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forward-only iterator returned by [`FrameSource::iter_frames`].
pub struct Frames<'a> {
    source: &'a mut FrameSource,
    start_frame: u64,
    next_fallback: u64,
    pending_error: Option<MillError>,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(err) = self.pending_error.take() {
            self.done = true;
            return Some(Err(err));
        }
        let fps = self.source.metadata.fps;
        let rotation = self.source.metadata.rotation;
        let Some(backend) = self.source.backend.as_mut() else {
            self.done = true;
            return Some(Err(MillError::decode(self.next_fallback, "source is closed")));
        };
        let time_base = backend.time_base();

        loop {
            let unit = match backend.next_unit() {
                Ok(Some(unit)) => unit,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            let index = frame_index_from_pts(unit.pts, time_base, fps, self.next_fallback);
            if index < self.start_frame as i64 {
                continue;
            }
            let index = index as u64;
            self.next_fallback = index + 1;
            return Some(Ok(DecodedFrame {
                index,
                image: rotate_frame(unit.image, rotation),
            }));
        }
    }
}
