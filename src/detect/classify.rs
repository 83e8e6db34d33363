use crate::config::SizeBin;

use super::resolve::Candidate;
use super::result::Detection;

/// Physical diameter of a circle of `radius_px` at the given scale.
pub fn diameter_mm(radius_px: f64, px_per_mm: f64) -> f64 {
    2.0 * radius_px / px_per_mm
}

/// Label of the first bin whose `[min, max)` interval contains `diameter_mm`.
pub fn classify_diameter(bins: &[SizeBin], diameter_mm: f64) -> Option<i32> {
    bins.iter()
        .find(|bin| bin.contains(diameter_mm))
        .map(|bin| bin.label)
}

/// Classify resolved candidates; those outside every bin are dropped.
pub(crate) fn classify(candidates: &[Candidate], bins: &[SizeBin], px_per_mm: f64) -> Vec<Detection> {
    candidates
        .iter()
        .filter_map(|c| {
            let diameter = diameter_mm(c.radius, px_per_mm);
            let Some(class) = classify_diameter(bins, diameter) else {
                log::debug!(
                    "no size bin for bead at ({}, {}) with diameter {diameter:.2} mm",
                    c.x,
                    c.y
                );
                return None;
            };
            Some(Detection {
                x: c.x,
                y: c.y,
                radius_px: c.radius,
                diameter_mm: diameter,
                class,
                confidence: c.confidence,
            })
        })
        .collect()
}
