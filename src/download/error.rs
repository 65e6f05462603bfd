use thiserror::Error;

use crate::photos::PhotosError;

/// Per-item download failures.
///
/// `is_skippable()` separates failures that only cost this item (it stays
/// pending and is retried on the next run) from remote contract violations
/// that abort the run.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} downloading {path}")]
    HttpStatus { status: u16, path: String },

    #[error("Transport error downloading {path}: {source}")]
    Http {
        path: String,
        #[source]
        source: PhotosError,
    },

    #[error("Could not refresh download link for {path}: {source}")]
    LinkRefresh {
        path: String,
        #[source]
        source: PhotosError,
    },

    #[error("Could not decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("Item {0} has neither photo nor video metadata")]
    InvalidMedia(String),
}

impl DownloadError {
    /// Whether the run may log this failure and continue with the next item.
    pub fn is_skippable(&self) -> bool {
        !matches!(self, DownloadError::InvalidMedia(_))
    }
}
