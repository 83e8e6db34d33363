//! Pure helpers shared by all frame-source backends.
//!
//! Nothing in here touches a decoder: frame indices and rotations are derived
//! from plain numbers so every backend agrees on them.

use crate::frame::Rotation;

/// Stream time base as a rational number of seconds per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn seconds(self, ticks: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ticks as f64 * f64::from(self.num) / f64::from(self.den)
    }

    /// Ticks for a presentation time in seconds, rounded to the nearest tick.
    pub fn ticks(self, seconds: f64) -> i64 {
        if self.num == 0 {
            return 0;
        }
        (seconds * f64::from(self.den) / f64::from(self.num)).round() as i64
    }
}

/// Reconstruct the source frame index of a decoded unit.
///
/// Applied independently to every unit so imprecise (keyframe-aligned) seeks
/// never cause index drift: `round(pts * time_base * fps)`. Without a usable
/// pts or fps the caller's sequential `fallback` index is returned.
/// The result may be negative for streams with a negative start offset.
pub fn frame_index_from_pts(pts: Option<i64>, time_base: TimeBase, fps: f64, fallback: u64) -> i64 {
    match pts {
        Some(pts) if fps > 0.0 && fps.is_finite() && time_base.den != 0 => {
            (time_base.seconds(pts) * fps).round() as i64
        }
        _ => fallback as i64,
    }
}

/// Rotation policy: explicit `rotate` tag, then display matrix, then none.
///
/// A tag that does not parse as a number is ignored.
pub fn resolve_rotation(rotate_tag: Option<&str>, display_matrix_ccw: Option<f64>) -> Rotation {
    if let Some(degrees) = rotate_tag.and_then(|tag| tag.trim().parse::<f64>().ok()) {
        return Rotation::from_degrees(degrees);
    }
    match display_matrix_ccw {
        Some(ccw) if ccw.is_finite() => Rotation::from_display_matrix(ccw),
        _ => Rotation::None,
    }
}

/// Counter-clockwise rotation in degrees encoded by a 3x3 16.16 display matrix.
///
/// Returns `None` for degenerate (zero-scale) matrices.
pub fn display_matrix_rotation(matrix: &[i32; 9]) -> Option<f64> {
    let fp = |v: i32| f64::from(v) / 65536.0;
    let scale0 = fp(matrix[0]).hypot(fp(matrix[3]));
    let scale1 = fp(matrix[1]).hypot(fp(matrix[4]));
    if scale0 == 0.0 || scale1 == 0.0 {
        return None;
    }
    let rotation = (fp(matrix[1]) / scale1)
        .atan2(fp(matrix[0]) / scale0)
        .to_degrees();
    Some(-rotation)
}

/// Parse a little-endian display matrix side-data blob (9 x i32).
pub fn parse_display_matrix(bytes: &[u8]) -> Option<[i32; 9]> {
    if bytes.len() < 36 {
        return None;
    }
    let mut matrix = [0i32; 9];
    for (slot, chunk) in matrix.iter_mut().zip(bytes.chunks_exact(4)) {
        *slot = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(matrix)
}
