use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the detection core.
///
/// Cancellation is not an error; a cancelled run returns `Ok` with a partial summary.
#[derive(Debug, Error)]
pub enum MillError {
    /// The video could not be opened: missing, corrupt, or without a video stream.
    #[error("failed to open video {path:?}: {reason}")]
    Open { path: String, reason: String },

    /// Mid-stream decode failure. Aborts the current iteration.
    #[error("decode failed near frame {frame}: {reason}")]
    Decode { frame: u64, reason: String },

    /// The result log could not be read or written as a whole.
    #[error("result log I/O failed for {path:?}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Contract violation on input shape (e.g. mask/frame size mismatch).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, MillError>;

impl MillError {
    pub(crate) fn open(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(frame: u64, reason: impl ToString) -> Self {
        Self::Decode {
            frame,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }
}
