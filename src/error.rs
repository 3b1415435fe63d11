//! Error taxonomy for the thumbnail pipeline.
//!
//! Every variant is terminal for the Item's current load cycle. None of them
//! is fatal to the process; the display layer degrades to a placeholder.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThumbnailError>;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// The source file vanished before it could be read.
    #[error("file not found: {path:?}")]
    NotFound { path: PathBuf },

    /// The source file exists but could not be read (permissions, I/O error).
    #[error("failed to read {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No decoder understands the container or codec.
    #[error("unsupported format: {path:?}")]
    UnsupportedFormat { path: PathBuf },

    /// Corrupt data, decoder crash, or a frame extraction that timed out.
    #[error("failed to decode {path:?}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    /// Work that was queued but never started.
    #[error("thumbnail request cancelled")]
    Cancelled,

    /// A pool worker thread could not be started.
    #[error("failed to start worker thread: {0}")]
    WorkerSpawn(#[source] io::Error),
}

impl ThumbnailError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Unreadable {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }

    /// Classify an error raised by the `image` crate while decoding `path`.
    pub fn from_image(path: &Path, err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(_) => Self::UnsupportedFormat {
                path: path.to_path_buf(),
            },
            image::ImageError::IoError(io) => Self::from_io(path, io),
            other => Self::decode_failed(path, other),
        }
    }

    pub fn decode_failed(path: &Path, reason: impl ToString) -> Self {
        Self::DecodeFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Short label used in log lines and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unreadable { .. } => "unreadable",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::DecodeFailed { .. } => "decode_failed",
            Self::Cancelled => "cancelled",
            Self::WorkerSpawn(_) => "worker_spawn",
        }
    }
}
