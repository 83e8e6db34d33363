//! Pixel-to-millimeter scale from two marked image points.

use crate::error::{MillError, Result};

/// `distance(p1, p2) / known_mm`, in pixels per millimeter.
pub fn px_per_mm(p1: (f64, f64), p2: (f64, f64), known_mm: f64) -> Result<f64> {
    if !(known_mm.is_finite() && known_mm > 0.0) {
        return Err(MillError::InvalidInput(format!(
            "known distance must be a positive number of millimeters, got {known_mm}"
        )));
    }
    let distance = (p2.0 - p1.0).hypot(p2.1 - p1.1);
    if !distance.is_finite() || distance == 0.0 {
        return Err(MillError::InvalidInput(
            "calibration points must be distinct".to_string(),
        ));
    }
    Ok(distance / known_mm)
}

/// Parse `"x,y"` into a point.
pub fn parse_point(raw: &str) -> Result<(f64, f64)> {
    let invalid = || MillError::InvalidInput(format!("expected a point as x,y, got '{raw}'"));
    let (x, y) = raw.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse().map_err(|_| invalid())?;
    let y = y.trim().parse().map_err(|_| invalid())?;
    Ok((x, y))
}
