//! Greedy, radius-descending resolution of merged detector candidates.
//!
//! Candidates from both detector paths are sorted largest first and each one
//! passes through ROI, brightness, annulus and duplicate checks against the
//! already-accepted set. The order is part of the contract: a large ring is
//! accepted before its own dark center can be mistaken for a small bead.

use image::GrayImage;

use crate::frame::RoiMask;

/// Side of the square brightness sample around a center.
const BRIGHTNESS_WINDOW: i64 = 5;
/// Mean enhanced intensity below this marks a shadow or hole.
const MIN_CENTER_BRIGHTNESS: f64 = 50.0;
/// Centers closer than this fraction of the larger radius are concentric.
const CONCENTRIC_FRACTION: f64 = 0.5;
/// Concentric candidates at most this fraction of the larger radius are ring artifacts.
const ANNULUS_RADIUS_RATIO: f64 = 0.8;
/// Concentric candidates within this relative radius difference are re-detections.
const DUPLICATE_RADIUS_TOLERANCE: f64 = 0.3;

/// Circle proposed by one detector path, in enhanced-image pixels.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Candidate {
    pub x: i32,
    pub y: i32,
    pub radius: f64,
    pub confidence: f64,
}

/// Why a candidate did not survive resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Rejection {
    OutsideRoi,
    Dark,
    Annulus,
    Duplicate,
}

/// Resolve `candidates` into the accepted set, largest radius first.
///
/// The sort is stable, so equal radii keep their merge order (pile path first).
pub(crate) fn resolve(
    mut candidates: Vec<Candidate>,
    enhanced: &GrayImage,
    roi: Option<&RoiMask>,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.radius.total_cmp(&a.radius));

    let mut accepted: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match check(&candidate, &accepted, enhanced, roi) {
            Ok(()) => accepted.push(candidate),
            Err(reason) => log::trace!("dropped {candidate:?}: {reason:?}"),
        }
    }
    accepted
}

fn check(
    candidate: &Candidate,
    accepted: &[Candidate],
    enhanced: &GrayImage,
    roi: Option<&RoiMask>,
) -> Result<(), Rejection> {
    if let Some(mask) = roi {
        if !mask.includes(i64::from(candidate.x), i64::from(candidate.y)) {
            return Err(Rejection::OutsideRoi);
        }
    }
    // Sampled at the center only, so a bead with a dark core is rejected whole.
    if let Some(mean) = center_brightness(enhanced, candidate.x, candidate.y) {
        if mean < MIN_CENTER_BRIGHTNESS {
            return Err(Rejection::Dark);
        }
    }
    for larger in accepted {
        let dist = f64::from(candidate.x - larger.x).hypot(f64::from(candidate.y - larger.y));
        if dist >= CONCENTRIC_FRACTION * larger.radius {
            continue;
        }
        if candidate.radius <= ANNULUS_RADIUS_RATIO * larger.radius {
            return Err(Rejection::Annulus);
        }
        if (candidate.radius - larger.radius).abs() < DUPLICATE_RADIUS_TOLERANCE * larger.radius {
            return Err(Rejection::Duplicate);
        }
    }
    Ok(())
}

/// Mean of the in-bounds part of the window around `(x, y)`; `None` if it is empty.
fn center_brightness(image: &GrayImage, x: i32, y: i32) -> Option<f64> {
    let half = BRIGHTNESS_WINDOW / 2;
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));
    let (x, y) = (i64::from(x), i64::from(y));

    let mut sum = 0u64;
    let mut count = 0u64;
    for sy in (y - half).max(0)..=(y + half).min(height - 1) {
        for sx in (x - half).max(0)..=(x + half).min(width - 1) {
            sum += u64::from(image.get_pixel(sx as u32, sy as u32)[0]);
            count += 1;
        }
    }
    (count > 0).then(|| sum as f64 / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn cand(x: i32, y: i32, radius: f64) -> Candidate {
        Candidate {
            x,
            y,
            radius,
            confidence: 0.8,
        }
    }

    fn bright(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([200]))
    }

    #[test]
    fn small_concentric_candidate_is_an_annulus() {
        let img = bright(100, 100);
        let out = resolve(vec![cand(50, 50, 8.0), cand(51, 50, 25.0)], &img, None);
        assert_eq!(out, vec![cand(51, 50, 25.0)]);
    }

    #[test]
    fn similar_concentric_candidate_is_a_duplicate() {
        let img = bright(100, 100);
        let out = resolve(vec![cand(50, 50, 20.0), cand(52, 51, 21.0)], &img, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].radius, 21.0);
        assert_eq!(
            check(&cand(50, 50, 20.0), &out, &img, None),
            Err(Rejection::Duplicate)
        );
    }

    #[test]
    fn neighbours_are_both_kept() {
        let img = bright(100, 100);
        let out = resolve(vec![cand(30, 50, 10.0), cand(55, 50, 10.0)], &img, None);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn dark_center_is_rejected() {
        let mut img = bright(40, 40);
        for y in 18..23 {
            for x in 18..23 {
                img.put_pixel(x, y, Luma([10]));
            }
        }
        assert_eq!(check(&cand(20, 20, 6.0), &[], &img, None), Err(Rejection::Dark));
        assert_eq!(check(&cand(8, 8, 6.0), &[], &img, None), Ok(()));
    }

    #[test]
    fn roi_excludes_centers_outside_mask() {
        let img = bright(60, 60);
        let mask = RoiMask::circle(60, 60, 15.0, 15.0, 10.0);
        let out = resolve(vec![cand(15, 15, 5.0), cand(45, 45, 5.0)], &img, Some(&mask));
        assert_eq!(out, vec![cand(15, 15, 5.0)]);
    }

    #[test]
    fn equal_radii_keep_merge_order() {
        let img = bright(100, 100);
        let first = Candidate {
            confidence: 0.8,
            ..cand(50, 50, 12.0)
        };
        let second = Candidate {
            confidence: 0.5,
            ..cand(51, 50, 12.0)
        };
        let out = resolve(vec![first.clone(), second], &img, None);
        assert_eq!(out, vec![first]);
    }

    #[test]
    fn brightness_window_clips_at_edges() {
        let img = bright(10, 10);
        assert_eq!(center_brightness(&img, 0, 0), Some(200.0));
        assert_eq!(center_brightness(&img, -10, -10), None);
    }
}
