use std::path::PathBuf;

use thiserror::Error;

/// Errors loading the OAuth credentials file.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Could not read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Credentials file {0} contains no access token")]
    MissingToken(PathBuf),

    #[error("Access token in {path} expired at {expiry}; re-authorize and try again")]
    Expired { path: PathBuf, expiry: String },
}
