use image::RgbImage;

use crate::config::{ConfigWarning, DetectionConfig};
use crate::detect::backend::DetectorBackend;
use crate::detect::classify::classify;
use crate::detect::contours::detect_flyers;
use crate::detect::hough::{detect_pile, HoughParams, MAX_RADIUS_PX, MIN_RADIUS_PX};
use crate::detect::preprocess::enhance;
use crate::detect::resolve::resolve;
use crate::detect::result::Detection;
use crate::error::Result;
use crate::frame::RoiMask;

/// Two-path bead detector: Hough circles for piles, contours for flyers.
///
/// Built from a sanitized [`DetectionConfig`]; the replaced values are kept in
/// [`BeadDetector::warnings`] and logged once at construction.
#[derive(Clone, Debug)]
pub struct BeadDetector {
    config: DetectionConfig,
    warnings: Vec<ConfigWarning>,
}

impl BeadDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        let (config, warnings) = config.sanitized();
        for warning in &warnings {
            log::warn!("detection config: {warning}");
        }
        Self { config, warnings }
    }

    /// The effective (sanitized) configuration.
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    fn hough_params(&self) -> HoughParams {
        let vision = &self.config.vision;
        HoughParams {
            edge_threshold: vision.hough_param1,
            vote_threshold: vision.hough_param2,
            min_dist: vision.min_dist_px,
            min_radius: MIN_RADIUS_PX,
            max_radius: MAX_RADIUS_PX,
        }
    }
}

impl Default for BeadDetector {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

impl DetectorBackend for BeadDetector {
    fn name(&self) -> &'static str {
        "beads"
    }

    fn detect(&self, frame: &RgbImage, roi: Option<&RoiMask>) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        if let Some(mask) = roi {
            mask.check_dimensions(width, height)?;
        }
        if width < 3 || height < 3 {
            return Ok(Vec::new());
        }

        let enhanced = enhance(frame);
        let mut candidates = detect_pile(&enhanced, &self.hough_params());
        let piles = candidates.len();
        candidates.extend(detect_flyers(&enhanced, self.config.vision.min_circularity));
        log::debug!(
            "{} pile and {} flyer candidates",
            piles,
            candidates.len() - piles
        );

        let accepted = resolve(candidates, &enhanced, roi);
        Ok(classify(&accepted, &self.config.bins, self.config.px_per_mm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeBin;
    use crate::error::MillError;

    #[test]
    fn invalid_config_is_sanitized_not_rejected() {
        let cfg = DetectionConfig {
            px_per_mm: -2.0,
            ..DetectionConfig::default()
        };
        let detector = BeadDetector::new(&cfg);
        assert_eq!(detector.config().px_per_mm, 1.0);
        assert!(!detector.warnings().is_empty());
    }

    #[test]
    fn mismatched_mask_is_an_error() {
        let detector = BeadDetector::new(&DetectionConfig {
            bins: vec![SizeBin::new(1, 0.0, 100.0)],
            ..DetectionConfig::default()
        });
        let frame = RgbImage::new(40, 30);
        let mask = RoiMask::circle(30, 40, 15.0, 20.0, 10.0);
        assert!(matches!(
            detector.detect(&frame, Some(&mask)),
            Err(MillError::InvalidInput(_))
        ));
    }

    #[test]
    fn degenerate_frames_have_no_detections() {
        let detector = BeadDetector::default();
        assert!(detector.detect(&RgbImage::new(0, 0), None).unwrap().is_empty());
        assert!(detector.detect(&RgbImage::new(2, 50), None).unwrap().is_empty());
    }
}
