//! OAuth credentials for the Photos Library API.
//!
//! The consent flow happens outside this tool. We read the authorized-user
//! JSON it leaves behind (`token`/`access_token`, optional `expiry`) and hand
//! the bearer token to the API client.

pub mod error;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use self::error::AuthError;

/// A loaded access token.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "token")]
    access_token: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credentials {
    pub fn access_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or_default()
    }

    /// Parsed expiry, if the file recorded one in RFC 3339 form.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
            .as_deref()
            .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn parse_credentials(path: &Path, raw: &str, now: DateTime<Utc>) -> Result<Credentials, AuthError> {
    let creds: Credentials = serde_json::from_str(raw).map_err(|source| AuthError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if creds.access_token().trim().is_empty() {
        return Err(AuthError::MissingToken(path.to_path_buf()));
    }

    if let Some(expiry) = creds.expiry() {
        if expiry <= now {
            return Err(AuthError::Expired {
                path: path.to_path_buf(),
                expiry: expiry.to_rfc3339(),
            });
        }
        tracing::debug!("Access token valid until {}", expiry);
    } else if let Some(raw_expiry) = &creds.expiry {
        tracing::warn!("Ignoring unparseable token expiry {:?}", raw_expiry);
    }

    Ok(creds)
}

/// Load credentials from an authorized-user JSON file.
pub async fn load_credentials(path: &Path) -> Result<Credentials, AuthError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AuthError::Read {
            path: PathBuf::from(path),
            source,
        })?;
    parse_credentials(path, &raw, Utc::now())
}
