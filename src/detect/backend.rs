use image::RgbImage;

use crate::detect::result::Detection;
use crate::error::Result;
use crate::frame::RoiMask;

/// Per-frame detector seam used by the pipeline coordinator.
///
/// Implementations are pure: no state carries across frames, so identical
/// inputs give identical outputs and calls may run on any thread.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect and classify beads in one rotation-normalized RGB frame.
    ///
    /// Only candidates whose center lies in `roi` (when given) are kept. A mask
    /// whose size differs from the frame is a contract violation.
    fn detect(&self, frame: &RgbImage, roi: Option<&RoiMask>) -> Result<Vec<Detection>>;
}
