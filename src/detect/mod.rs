mod backend;
mod classify;
mod contours;
mod engine;
mod hough;
mod preprocess;
mod resolve;
mod result;

pub use backend::DetectorBackend;
pub use classify::{classify_diameter, diameter_mm};
pub use engine::BeadDetector;
pub use result::{Detection, FrameRecord};
