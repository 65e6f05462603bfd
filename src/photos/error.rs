use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotosError {
    #[error("Photos API error (HTTP {status}) from {endpoint}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },
    #[error("Media item {0} has neither photo nor video metadata")]
    InvalidMedia(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PhotosError {
    /// Rate limits, server errors, and transport failures are worth retrying;
    /// every other API status is a permanent answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            PhotosError::Api { status, .. } => *status == 429 || *status >= 500,
            PhotosError::Http(e) => !e.is_decode(),
            PhotosError::InvalidMedia(_) | PhotosError::Json(_) => false,
        }
    }
}
