//! Durable local index: mirrored album and content metadata plus the
//! download ledger, stored in SQLite.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{LocalIndex, SqliteIndex};
pub use error::IndexError;
pub use types::{
    AlbumRecord, ContentRecord, DownloadRecord, DownloadRunStats, NewDownloadRun, UpsertCounts,
    UrlRefresh, UNFILED_ALBUM_DIR,
};
