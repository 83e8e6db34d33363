//! Pile detector: gradient Hough transform for tightly packed round beads.
//!
//! Every edge pixel votes along its gradient direction, both ways, for centers
//! at each radius in the search range. Votes are split bilinearly between the
//! four nearest cells and the grid is Gaussian-smoothed, so a disk's votes
//! gather into one peak whatever its radius. Peaks above the vote threshold
//! become centers (strongest first, enforcing a minimum spacing), and each
//! center's radius is the distance band with the best edge support per unit of
//! circumference.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use super::resolve::Candidate;

/// Radius search range in pixels.
pub(crate) const MIN_RADIUS_PX: u32 = 4;
pub(crate) const MAX_RADIUS_PX: u32 = 30;

/// Fixed weight for pile-detector hits.
const PILE_CONFIDENCE: f64 = 0.8;

/// Spread of the accumulator smoothing, in cells.
const ACCUMULATOR_SIGMA: f32 = 1.0;

type Accumulator = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Clone, Copy, Debug)]
pub(crate) struct HoughParams {
    /// Upper Canny threshold; the lower one is half of it.
    pub edge_threshold: f64,
    /// Minimum smoothed votes for a center and minimum radius support.
    pub vote_threshold: f64,
    pub min_dist: f64,
    pub min_radius: u32,
    pub max_radius: u32,
}

pub(crate) fn detect_pile(enhanced: &GrayImage, params: &HoughParams) -> Vec<Candidate> {
    let (width, height) = enhanced.dimensions();
    if width < 3 || height < 3 || params.max_radius < params.min_radius {
        return Vec::new();
    }

    let high = params.edge_threshold as f32;
    let edges = canny(enhanced, high * 0.5, high);
    let gx = horizontal_sobel(enhanced);
    let gy = vertical_sobel(enhanced);

    let accumulator = smooth(&vote(&edges, &gx, &gy, params));
    let centers = peak_centers(&accumulator, params.vote_threshold);

    let mut found: Vec<Candidate> = Vec::new();
    let min_dist_sq = params.min_dist * params.min_dist;
    for (cx, cy) in centers {
        let too_close = found.iter().any(|c| {
            let dx = f64::from(c.x - cx);
            let dy = f64::from(c.y - cy);
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }
        if let Some(radius) = estimate_radius(&edges, cx, cy, params) {
            found.push(Candidate {
                x: cx,
                y: cy,
                radius,
                confidence: PILE_CONFIDENCE,
            });
        }
    }
    found
}

fn vote(
    edges: &GrayImage,
    gx: &ImageBuffer<Luma<i16>, Vec<i16>>,
    gy: &ImageBuffer<Luma<i16>, Vec<i16>>,
    params: &HoughParams,
) -> Accumulator {
    let (width, height) = edges.dimensions();
    let mut acc = Accumulator::new(width, height);
    let x_limit = (width - 1) as f64;
    let y_limit = (height - 1) as f64;

    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let dx = f64::from(gx.get_pixel(x, y)[0]);
        let dy = f64::from(gy.get_pixel(x, y)[0]);
        let mag = dx.hypot(dy);
        if mag == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / mag, dy / mag);
        for sign in [1.0, -1.0] {
            for r in params.min_radius..=params.max_radius {
                let vx = x as f64 + sign * ux * r as f64;
                let vy = y as f64 + sign * uy * r as f64;
                if vx < 0.0 || vy < 0.0 || vx >= x_limit || vy >= y_limit {
                    break;
                }
                bilinear_add(&mut acc, vx, vy);
            }
        }
    }
    acc
}

/// Splits one vote between the four cells around `(x, y)`.
///
/// Callers keep `x < width - 1` and `y < height - 1`.
fn bilinear_add(acc: &mut Accumulator, x: f64, y: f64) {
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let fx = (x - x.floor()) as f32;
    let fy = (y - y.floor()) as f32;
    acc.get_pixel_mut(x0, y0)[0] += (1.0 - fx) * (1.0 - fy);
    acc.get_pixel_mut(x0 + 1, y0)[0] += fx * (1.0 - fy);
    acc.get_pixel_mut(x0, y0 + 1)[0] += (1.0 - fx) * fy;
    acc.get_pixel_mut(x0 + 1, y0 + 1)[0] += fx * fy;
}

/// Gaussian-smoothed votes, rescaled so each cell reads as the weighted vote
/// count around it.
fn smooth(acc: &Accumulator) -> Accumulator {
    let gain = 2.0 * std::f32::consts::PI * ACCUMULATOR_SIGMA * ACCUMULATOR_SIGMA;
    let mut smoothed = gaussian_blur_f32(acc, ACCUMULATOR_SIGMA);
    for pixel in smoothed.pixels_mut() {
        pixel[0] *= gain;
    }
    smoothed
}

/// Local maxima above the vote threshold, strongest first (row-major on ties).
fn peak_centers(acc: &Accumulator, threshold: f64) -> Vec<(i32, i32)> {
    let (width, height) = acc.dimensions();
    let at = |x: u32, y: u32| acc.get_pixel(x, y)[0];
    let mut peaks: Vec<(f32, u32, u32)> = Vec::new();
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let v = at(x, y);
            if f64::from(v) > threshold
                && v > at(x - 1, y)
                && v >= at(x + 1, y)
                && v > at(x, y - 1)
                && v >= at(x, y + 1)
            {
                peaks.push((v, y, x));
            }
        }
    }
    peaks.sort_by(|a, b| b.0.total_cmp(&a.0).then((a.1, a.2).cmp(&(b.1, b.2))));
    peaks
        .into_iter()
        .map(|(_, y, x)| (x as i32, y as i32))
        .collect()
}

/// Best-supported radius around a center; `None` if support is below the threshold.
fn estimate_radius(edges: &GrayImage, cx: i32, cy: i32, params: &HoughParams) -> Option<f64> {
    let (width, height) = edges.dimensions();
    let reach = params.max_radius as i32 + 1;
    let x0 = (cx - reach).max(0) as u32;
    let y0 = (cy - reach).max(0) as u32;
    let x1 = ((cx + reach) as u32).min(width - 1);
    let y1 = ((cy + reach) as u32).min(height - 1);

    let bins = params.max_radius as usize + 2;
    let mut count = vec![0u32; bins];
    let mut sum = vec![0f64; bins];
    for y in y0..=y1 {
        for x in x0..=x1 {
            if edges.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let d = (f64::from(x as i32 - cx)).hypot(f64::from(y as i32 - cy));
            let bin = d.round() as usize;
            if bin < params.min_radius as usize || bin >= bins {
                continue;
            }
            count[bin] += 1;
            sum[bin] += d;
        }
    }

    // Two adjacent one-pixel bands, scored by support per unit radius.
    let mut best: Option<(f64, u32, f64)> = None;
    for r in params.min_radius as usize..=params.max_radius as usize {
        let support = count[r] + count[r + 1];
        if support == 0 {
            continue;
        }
        let radius = (sum[r] + sum[r + 1]) / f64::from(support);
        let score = f64::from(support) / radius;
        if best.map_or(true, |(best_score, _, _)| score >= best_score) {
            best = Some((score, support, radius));
        }
    }

    match best {
        Some((_, support, radius)) if f64::from(support) > params.vote_threshold => Some(radius),
        _ => None,
    }
}
