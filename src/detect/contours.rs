//! Flyer detector: isolated beads found as closed, nearly circular contours.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::geometry::{arc_length, contour_area, convex_hull};
use imageproc::morphology::close;
use imageproc::point::Point;

use super::resolve::Candidate;

/// Contours enclosing less area than this (px²) are noise.
const MIN_CONTOUR_AREA: f64 = 50.0;
/// Flyer confidence is this fraction of circularity.
const FLYER_CONFIDENCE_SCALE: f64 = 0.6;
/// Keeps the edge detector from marking flat regions when Otsu returns 0.
const MIN_EDGE_THRESHOLD: f32 = 10.0;

pub(crate) fn detect_flyers(enhanced: &GrayImage, min_circularity: f64) -> Vec<Candidate> {
    let (width, height) = enhanced.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let high = f32::from(otsu_level(enhanced)).max(MIN_EDGE_THRESHOLD);
    let edges = canny(enhanced, 0.5 * high, high);
    // L1 radius 1 is the 3x3 cross, i.e. the 3x3 elliptical kernel.
    let closed = close(&edges, Norm::L1, 1);

    let mut found = Vec::new();
    for contour in find_contours::<i32>(&closed) {
        if !matches!(contour.border_type, BorderType::Outer) || contour.parent.is_some() {
            continue;
        }
        let area = contour_area(&contour.points).abs();
        if area < MIN_CONTOUR_AREA {
            continue;
        }
        let perimeter = arc_length(&contour.points, true);
        if perimeter <= 0.0 {
            continue;
        }
        let circularity = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
        if circularity <= min_circularity {
            log::trace!("rejected contour area={area:.1} circularity={circularity:.3}");
            continue;
        }
        let Some((cx, cy, radius)) = min_enclosing_circle(&contour.points) else {
            continue;
        };
        found.push(Candidate {
            x: cx.round() as i32,
            y: cy.round() as i32,
            radius,
            confidence: (FLYER_CONFIDENCE_SCALE * circularity).clamp(0.0, 1.0),
        });
    }
    found
}

/// Smallest circle containing all points: `(cx, cy, radius)`.
///
/// Runs incremental Welzl over the convex hull vertices.
pub(crate) fn min_enclosing_circle(points: &[Point<i32>]) -> Option<(f64, f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let pts: Vec<(f64, f64)> = convex_hull(points)
        .into_iter()
        .map(|p| (f64::from(p.x), f64::from(p.y)))
        .collect();
    let first = *pts.first()?;

    let mut circle = (first.0, first.1, 0.0);
    for i in 1..pts.len() {
        if inside(circle, pts[i]) {
            continue;
        }
        circle = (pts[i].0, pts[i].1, 0.0);
        for j in 0..i {
            if inside(circle, pts[j]) {
                continue;
            }
            circle = circle_from_two(pts[i], pts[j]);
            for k in 0..j {
                if !inside(circle, pts[k]) {
                    circle = circle_from_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    Some(circle)
}

fn inside((cx, cy, r): (f64, f64, f64), (x, y): (f64, f64)) -> bool {
    (x - cx).hypot(y - cy) <= r + 1e-7 * (1.0 + r)
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> (f64, f64, f64) {
    let cx = (a.0 + b.0) / 2.0;
    let cy = (a.1 + b.1) / 2.0;
    (cx, cy, (a.0 - b.0).hypot(a.1 - b.1) / 2.0)
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> (f64, f64, f64) {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-12 {
        // Collinear: the widest pair spans the others.
        let candidates = [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)];
        return candidates
            .into_iter()
            .fold((0.0, 0.0, -1.0), |best, cand| if cand.2 > best.2 { cand } else { best });
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let cx = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let cy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    (cx, cy, (a.0 - cx).hypot(a.1 - cy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    #[test]
    fn enclosing_circle_of_square_corners() {
        let pts = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
            Point::new(5, 5),
        ];
        let (cx, cy, r) = min_enclosing_circle(&pts).unwrap();
        assert!((cx - 5.0).abs() < 1e-9 && (cy - 5.0).abs() < 1e-9);
        assert!((r - 50f64.sqrt()).abs() < 1e-9);
        assert!(min_enclosing_circle(&[]).is_none());
    }

    #[test]
    fn isolated_disk_is_a_flyer() {
        let mut img = GrayImage::new(100, 100);
        draw_filled_circle_mut(&mut img, (50, 50), 20, Luma([255]));
        let hits = detect_flyers(&img, 0.65);
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert!((hit.x - 50).abs() <= 1 && (hit.y - 50).abs() <= 1, "{hit:?}");
        assert!(hit.radius > 19.0 && hit.radius < 23.0, "{hit:?}");
        assert!(hit.confidence > 0.45 && hit.confidence <= 0.6, "{hit:?}");
    }

    #[test]
    fn elongated_shape_is_rejected() {
        let mut img = GrayImage::new(120, 60);
        draw_filled_rect_mut(&mut img, Rect::at(10, 25).of_size(100, 8), Luma([255]));
        assert!(detect_flyers(&img, 0.65).is_empty());
    }
}
