//! Frame ingestion.
//!
//! `FrameSource` opens a local video (feature: ingest-ffmpeg) or a synthetic
//! `stub://` video and yields rotation-normalized frames with stable indices.
//!
//! The ingestion layer is responsible for:
//! - Normalizing metadata (post-rotation dimensions, fps, frame count)
//! - Rebuilding frame indices from presentation timestamps after every seek
//! - Releasing the decoder on every exit path

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod normalize;
pub mod synthetic;

pub use file::{FrameSource, Frames};
pub use normalize::{frame_index_from_pts, TimeBase};
pub use synthetic::SyntheticVideo;
