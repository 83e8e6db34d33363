//! Bead detection for grinding-mill video.
//!
//! Locates and size-classifies spherical grinding media frame by frame and
//! writes a durable, resumable detection log.
//!
//! # Architecture
//!
//! Frames flow through one sequential pipeline:
//!
//! 1. **Ingest**: `FrameSource` decodes frames with stable, timestamp-derived
//!    indices and normalizes display rotation.
//! 2. **Detect**: `BeadDetector` enhances each frame, proposes circles from two
//!    paths (gradient Hough for piles, contours for flyers), resolves them
//!    largest first and classifies diameters into size bins.
//! 3. **Store**: `JsonlResultStore` appends one `FrameRecord` per line and
//!    keeps a frame-id index; the last line for a frame wins on reload.
//! 4. **Coordinate**: `PipelineCoordinator` drives the above with progress,
//!    frame limits and cooperative cancellation.
//!
//! # Module Structure
//!
//! - `frame`: rotation, metadata, decoded frames, ROI masks
//! - `ingest`: frame sources (local files, synthetic videos)
//! - `detect`: detector backend trait and the bead detector
//! - `store`: result log
//! - `pipeline`: batch coordinator
//! - `config`, `calibration`, `error`: supporting types

pub mod calibration;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod store;

pub use config::{ConfigWarning, DetectionConfig, SizeBin, VisionSettings};
pub use detect::{BeadDetector, Detection, DetectorBackend, FrameRecord};
pub use error::{MillError, Result};
pub use frame::{DecodedFrame, RoiMask, Rotation, VideoMetadata};
pub use ingest::{FrameSource, SyntheticVideo};
pub use pipeline::{CancelHandle, PipelineCoordinator, RoiHandle, RunSummary};
pub use store::{InMemoryResultStore, JsonlResultStore, ResultStore};
