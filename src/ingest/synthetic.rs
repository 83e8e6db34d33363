//! In-memory video used by tests and by `stub://` paths.
//!
//! Behaves like a real container where it matters for correctness: frames carry
//! presentation timestamps in a stream time base, seeks land on the nearest
//! earlier keyframe, and rotation comes from metadata rather than the raster.

use image::{Rgb, RgbImage};

use super::normalize::{resolve_rotation, TimeBase};
use crate::error::{MillError, Result};
use crate::frame::{Rotation, VideoMetadata};

/// Programmatic synthetic video. Frames are stored as the decoder would emit them
/// (before rotation correction).
#[derive(Clone, Debug)]
pub struct SyntheticVideo {
    frames: Vec<RgbImage>,
    fps: f64,
    time_base: TimeBase,
    keyframe_interval: usize,
    rotate_tag: Option<String>,
    display_matrix_ccw: Option<f64>,
    report_frame_count: bool,
    emit_pts: bool,
    fail_at: Option<usize>,
}

impl SyntheticVideo {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            time_base: TimeBase::new(1, 90_000),
            keyframe_interval: 1,
            rotate_tag: None,
            display_matrix_ccw: None,
            report_frame_count: true,
            emit_pts: true,
            fail_at: None,
        }
    }

    /// Five 100x100 frames, white radius-20 disk at (50, 50) on black, 30 fps.
    pub fn beads() -> Self {
        let frame = RgbImage::from_fn(100, 100, |x, y| {
            let dx = x as f64 - 50.0;
            let dy = y as f64 - 50.0;
            if dx * dx + dy * dy <= 400.0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        Self::new(vec![frame; 5], 30.0).with_keyframe_interval(2)
    }

    pub fn with_time_base(mut self, time_base: TimeBase) -> Self {
        self.time_base = time_base;
        self
    }

    /// Seeks land on multiples of this interval.
    pub fn with_keyframe_interval(mut self, interval: usize) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub fn with_rotate_tag(mut self, tag: impl Into<String>) -> Self {
        self.rotate_tag = Some(tag.into());
        self
    }

    pub fn with_display_matrix(mut self, ccw_degrees: f64) -> Self {
        self.display_matrix_ccw = Some(ccw_degrees);
        self
    }

    /// Hide the frame count, as some containers do.
    pub fn without_frame_count(mut self) -> Self {
        self.report_frame_count = false;
        self
    }

    /// Emit decoded units without presentation timestamps.
    pub fn without_pts(mut self) -> Self {
        self.emit_pts = false;
        self
    }

    /// Fail decoding when the cursor reaches this frame position.
    pub fn failing_at(mut self, position: usize) -> Self {
        self.fail_at = Some(position);
        self
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub(crate) fn metadata(&self) -> VideoMetadata {
        let rotation = self.rotation();
        let (raw_w, raw_h) = self
            .frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));
        let (width, height) = rotation.apply_to_dims(raw_w, raw_h);
        VideoMetadata {
            width,
            height,
            fps: self.fps,
            frame_count: self.report_frame_count.then_some(self.frames.len() as u64),
            rotation,
        }
    }

    fn rotation(&self) -> Rotation {
        resolve_rotation(self.rotate_tag.as_deref(), self.display_matrix_ccw)
    }

    fn pts_of(&self, position: usize) -> i64 {
        if self.fps <= 0.0 {
            return position as i64;
        }
        self.time_base.ticks(position as f64 / self.fps)
    }
}

/// A decoded unit before index reconstruction and rotation.
pub(crate) struct RawUnit {
    pub pts: Option<i64>,
    pub image: RgbImage,
}

/// Decoding cursor over a `SyntheticVideo`.
pub(crate) struct SyntheticSource {
    video: SyntheticVideo,
    cursor: usize,
}

impl SyntheticSource {
    pub(crate) fn new(video: SyntheticVideo) -> Self {
        Self { video, cursor: 0 }
    }

    pub(crate) fn metadata(&self) -> VideoMetadata {
        self.video.metadata()
    }

    pub(crate) fn time_base(&self) -> TimeBase {
        self.video.time_base
    }

    /// Backward seek to the keyframe at or before `target_pts`.
    pub(crate) fn seek(&mut self, target_pts: i64) {
        let fps = self.video.fps;
        let position = if fps > 0.0 {
            let seconds = self.video.time_base.seconds(target_pts.max(0));
            // Small epsilon so exact frame boundaries survive float rounding.
            (seconds * fps + 1e-6).floor() as usize
        } else {
            target_pts.max(0) as usize
        };
        let position = position.min(self.video.frames.len());
        let interval = self.video.keyframe_interval;
        self.cursor = (position / interval) * interval;
    }

    pub(crate) fn next_unit(&mut self) -> Result<Option<RawUnit>> {
        if self.video.fail_at == Some(self.cursor) {
            return Err(MillError::decode(
                self.cursor as u64,
                "synthetic decode failure",
            ));
        }
        let Some(image) = self.video.frames.get(self.cursor).cloned() else {
            return Ok(None);
        };
        let pts = self.video.emit_pts.then(|| self.video.pts_of(self.cursor));
        self.cursor += 1;
        Ok(Some(RawUnit { pts, image }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frames(n: usize) -> Vec<RgbImage> {
        (0..n).map(|_| RgbImage::new(4, 2)).collect()
    }

    #[test]
    fn seek_lands_on_earlier_keyframe() {
        let video = SyntheticVideo::new(blank_frames(20), 25.0).with_keyframe_interval(6);
        let tb = video.time_base();
        let mut source = SyntheticSource::new(video);

        source.seek(tb.ticks(13.0 / 25.0));
        assert_eq!(source.cursor, 12);
        source.seek(tb.ticks(5.0 / 25.0));
        assert_eq!(source.cursor, 0);
        source.seek(tb.ticks(18.0 / 25.0));
        assert_eq!(source.cursor, 18);
    }

    #[test]
    fn metadata_reflects_rotation() {
        let video = SyntheticVideo::new(blank_frames(3), 30.0).with_rotate_tag("90");
        let meta = video.metadata();
        assert_eq!((meta.width, meta.height), (2, 4));
        assert_eq!(meta.rotation, Rotation::Cw90);
        assert_eq!(meta.frame_count, Some(3));

        let hidden = SyntheticVideo::new(blank_frames(3), 30.0).without_frame_count();
        assert_eq!(hidden.metadata().frame_count, None);
    }

    #[test]
    fn failure_is_reported_at_position() {
        let mut source = SyntheticSource::new(SyntheticVideo::new(blank_frames(3), 30.0).failing_at(1));
        assert!(source.next_unit().unwrap().is_some());
        assert!(matches!(
            source.next_unit(),
            Err(MillError::Decode { frame: 1, .. })
        ));
    }
}
