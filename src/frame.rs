//! Frame-level types shared by ingest, detection and the coordinator.
//!
//! - `Rotation`: discrete display rotation, decoupled from decoder constants.
//! - `VideoMetadata`: dimensions after rotation normalization, fps, frame count.
//! - `DecodedFrame`: one rotation-normalized RGB frame with its source index.
//! - `RoiMask`: read-only region-of-interest raster supplied by the caller.

use std::path::Path;

use image::{imageops, GrayImage, Luma, RgbImage};

use crate::error::{MillError, Result};

/// Mask pixels strictly above this value are part of the detection region.
pub const ROI_INCLUDE_THRESHOLD: u8 = 127;

// ----------------------------------------------------------------------------
// Rotation
// ----------------------------------------------------------------------------

/// Clockwise rotation that must be applied to decoded rasters for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Snap an arbitrary clockwise angle in degrees to the nearest quarter turn.
    ///
    /// Negative angles wrap (`-90` is `Cw270`). Non-finite input yields `None`.
    pub fn from_degrees(degrees: f64) -> Self {
        if !degrees.is_finite() {
            return Self::None;
        }
        let quarter_turns = (degrees / 90.0).round() as i64;
        match quarter_turns.rem_euclid(4) {
            1 => Self::Cw90,
            2 => Self::Cw180,
            3 => Self::Cw270,
            _ => Self::None,
        }
    }

    /// Display-matrix angles are counter-clockwise; convert to a clockwise correction.
    pub fn from_display_matrix(ccw_degrees: f64) -> Self {
        Self::from_degrees(-ccw_degrees)
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// True when the rotation swaps width and height.
    pub fn is_transposed(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }

    /// Dimensions of a `width x height` raster after this rotation.
    pub fn apply_to_dims(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_transposed() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// Rotate a decoded raster by a discrete quarter turn.
pub fn rotate_frame(image: RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::None => image,
        Rotation::Cw90 => imageops::rotate90(&image),
        Rotation::Cw180 => imageops::rotate180(&image),
        Rotation::Cw270 => imageops::rotate270(&image),
    }
}

// ----------------------------------------------------------------------------
// Metadata and frames
// ----------------------------------------------------------------------------

/// Normalized stream metadata. `width`/`height` are post-rotation.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Total frame count if the container reports one.
    pub frame_count: Option<u64>,
    pub rotation: Rotation,
}

impl VideoMetadata {
    /// Presentation time of a frame index; zero when fps is unusable.
    pub fn timestamp_for(&self, frame_id: u64) -> f64 {
        timestamp_for(frame_id, self.fps)
    }
}

pub(crate) fn timestamp_for(frame_id: u64, fps: f64) -> f64 {
    if fps > 0.0 && fps.is_finite() {
        frame_id as f64 / fps
    } else {
        0.0
    }
}

/// One decoded, rotation-normalized frame.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    /// Source frame index, reconstructed from the presentation timestamp.
    pub index: u64,
    pub image: RgbImage,
}

// ----------------------------------------------------------------------------
// RoiMask
// ----------------------------------------------------------------------------

/// Single-channel region-of-interest mask, same size as the normalized frame.
#[derive(Clone, Debug)]
pub struct RoiMask {
    mask: GrayImage,
}

impl RoiMask {
    pub fn from_gray(mask: GrayImage) -> Self {
        Self { mask }
    }

    /// Load a mask from any raster format the `image` crate decodes; converted to luma.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|e| {
            MillError::InvalidInput(format!("failed to read ROI mask {}: {}", path.display(), e))
        })?;
        Ok(Self::from_gray(decoded.to_luma8()))
    }

    /// Filled circular mask, e.g. the visible drum face.
    pub fn circle(width: u32, height: u32, cx: f64, cy: f64, radius: f64) -> Self {
        let r2 = radius * radius;
        let mask = GrayImage::from_fn(width, height, |x, y| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r2 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        Self { mask }
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    /// Out-of-bounds locations are never included.
    pub fn includes(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            return false;
        }
        self.mask.get_pixel(x as u32, y as u32)[0] > ROI_INCLUDE_THRESHOLD
    }

    /// The mask must match the rotation-normalized frame size.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        if self.width() != width || self.height() != height {
            return Err(MillError::InvalidInput(format!(
                "ROI mask is {}x{} but frames are {}x{}",
                self.width(),
                self.height(),
                width,
                height
            )));
        }
        Ok(())
    }
}
