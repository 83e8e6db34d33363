//! Grayscale conversion, glare-suppressing smoothing and local contrast
//! enhancement.

use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::bilateral_filter;

const BILATERAL_WINDOW: u32 = 9;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPATIAL: f32 = 75.0;

const CLAHE_CLIP_LIMIT: f64 = 2.0;
const CLAHE_GRID: u32 = 8;

/// Grayscale plus the enhanced image both detector paths run on.
pub(crate) fn enhance(frame: &RgbImage) -> GrayImage {
    let gray = imageops::grayscale(frame);
    let smoothed = bilateral_filter(
        &gray,
        BILATERAL_WINDOW,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPATIAL,
    );
    clahe(&smoothed, CLAHE_CLIP_LIMIT, CLAHE_GRID)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `grid x grid` tile layout (edge tiles may be
/// smaller); each tile gets a clipped, redistributed histogram mapping and pixels
/// are bilinearly interpolated between the four nearest tile mappings.
pub(crate) fn clahe(image: &GrayImage, clip_limit: f64, grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || grid == 0 {
        return image.clone();
    }
    let tile_w = width.div_ceil(grid);
    let tile_h = height.div_ceil(grid);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(image, (x0, y0, x1, y1), clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let max_tx = (tiles_x - 1) as f64;
    let max_ty = (tiles_y - 1) as f64;

    GrayImage::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x, y)[0] as usize;

        let fx = ((x as f64 + 0.5) / tile_w as f64 - 0.5).clamp(0.0, max_tx);
        let fy = ((y as f64 + 0.5) / tile_h as f64 - 0.5).clamp(0.0, max_ty);
        let tx0 = fx.floor() as u32;
        let ty0 = fy.floor() as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = fx - tx0 as f64;
        let ay = fy - ty0 as f64;

        let top = lut_at(tx0, ty0)[v] * (1.0 - ax) + lut_at(tx1, ty0)[v] * ax;
        let bottom = lut_at(tx0, ty1)[v] * (1.0 - ax) + lut_at(tx1, ty1)[v] * ax;
        let value = top * (1.0 - ay) + bottom * ay;
        image::Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(image: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f64) -> [f64; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    let limit = ((clip_limit * area as f64 / 256.0) as u32).max(1);
    let mut clipped = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            clipped += *bin - limit;
            *bin = limit;
        }
    }
    let batch = clipped / 256;
    let residual = clipped - batch * 256;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1) as usize;
        for bin in hist.iter_mut().step_by(step).take(residual as usize) {
            *bin += 1;
        }
    }

    let scale = 255.0 / area.max(1) as f64;
    let mut lut = [0.0f64; 256];
    let mut cdf = 0u32;
    for (value, count) in hist.iter().enumerate() {
        cdf += count;
        lut[value] = (cdf as f64 * scale).min(255.0);
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn clahe_keeps_white_white() {
        let img = GrayImage::from_fn(64, 64, |x, _| if x < 32 { Luma([0]) } else { Luma([255]) });
        let out = clahe(&img, 2.0, 8);
        assert_eq!(out.get_pixel(60, 10)[0], 255);
        assert!(out.get_pixel(2, 10)[0] < 20);
    }

    #[test]
    fn clahe_handles_tiny_and_empty_images() {
        let tiny = GrayImage::from_pixel(3, 2, Luma([90]));
        assert_eq!(clahe(&tiny, 2.0, 8).dimensions(), (3, 2));
        let empty = GrayImage::new(0, 0);
        assert_eq!(clahe(&empty, 2.0, 8).dimensions(), (0, 0));
    }

    #[test]
    fn enhance_is_deterministic() {
        let frame = RgbImage::from_fn(40, 30, |x, y| image::Rgb([(x * 6) as u8, (y * 8) as u8, 40]));
        assert_eq!(enhance(&frame), enhance(&frame));
    }
}
