use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Cannot create index directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot open index {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Pragmas or DDL failed while preparing the schema.
    #[error("Index schema setup failed: {0}")]
    Schema(#[from] rusqlite::Error),

    #[error("Index was written by a newer gpsync (schema v{found}, this build reads up to v{supported})")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("Index query failed: {source}")]
    Query { source: rusqlite::Error },

    /// A previous holder of the connection panicked mid-transaction.
    #[error("Index connection lock poisoned")]
    Poisoned,

    #[error("Index worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IndexError {
    /// Wrap a statement failure. Used with `map_err` so `?` on a
    /// `rusqlite::Error` inside query code does not land in [`IndexError::Schema`].
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query { source }
    }
}
