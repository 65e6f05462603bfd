//! Row types for the local index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::photos::types::VideoProcessingStatus;
use crate::photos::{Album, MediaItem, MediaKind, PhotosError};

/// Destination sub-directory for items with no album association.
pub const UNFILED_ALBUM_DIR: &str = "No Album";

/// A mirrored remote album. The title is written once, on first sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumRecord {
    pub id: String,
    pub title: Option<String>,
}

impl From<&Album> for AlbumRecord {
    fn from(album: &Album) -> Self {
        Self {
            id: album.id.clone(),
            title: album.title.clone(),
        }
    }
}

impl AlbumRecord {
    /// The shape the remote catalog expects when searching this album.
    pub fn to_remote(&self) -> Album {
        Album {
            id: self.id.clone(),
            title: self.title.clone(),
            product_url: None,
            media_items_count: None,
        }
    }
}

/// One indexed photo or video.
///
/// `base_url`/`download_url` are presigned and expire; they are the only
/// fields (besides `album_id` and `updated_at`) rewritten after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub id: String,
    pub album_id: Option<String>,
    pub base_url: String,
    pub download_url: String,
    pub filename: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub fps: Option<f64>,
    pub processing_status: Option<VideoProcessingStatus>,
    pub creation_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub media_kind: MediaKind,
}

impl ContentRecord {
    /// Build a new row from API metadata, associated with `album_id`.
    ///
    /// Fails with [`PhotosError::InvalidMedia`] when the item reports neither
    /// photo nor video metadata.
    pub fn from_media_item(item: &MediaItem, album_id: Option<&str>) -> Result<Self, PhotosError> {
        let media_kind = item
            .kind()
            .ok_or_else(|| PhotosError::InvalidMedia(item.id.clone()))?;
        let download_url = format!("{}{}", item.base_url, media_kind.download_suffix());

        let creation_time = DateTime::parse_from_rfc3339(&item.media_metadata.creation_time)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                tracing::warn!(
                    id = %item.id,
                    "Unparseable creationTime {:?}: {}",
                    item.media_metadata.creation_time,
                    e
                );
                DateTime::UNIX_EPOCH
            });

        let dimension = |v: &Option<String>| -> u32 {
            v.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0)
        };

        let (fps, processing_status) = match &item.media_metadata.video {
            Some(video) => (video.fps, video.status),
            None => (None, None),
        };

        let now = Utc::now();
        Ok(Self {
            id: item.id.clone(),
            album_id: album_id.map(str::to_string),
            base_url: item.base_url.clone(),
            download_url,
            filename: item.filename.clone(),
            mime_type: item.mime_type.clone(),
            description: item.description.clone().filter(|d| !d.is_empty()),
            fps,
            processing_status,
            creation_time,
            created_at: now,
            updated_at: now,
            width: dimension(&item.media_metadata.width),
            height: dimension(&item.media_metadata.height),
            media_kind,
        })
    }

    /// The field-level patch applied when this item is re-observed.
    pub fn url_patch(&self) -> ContentPatch {
        ContentPatch {
            id: self.id.clone(),
            album_id: self.album_id.clone(),
            base_url: self.base_url.clone(),
            download_url: self.download_url.clone(),
        }
    }
}

/// Volatile fields of a content row. Applying a patch never touches
/// filename, dimensions, timestamps of creation, or media metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentPatch {
    pub id: String,
    pub album_id: Option<String>,
    pub base_url: String,
    pub download_url: String,
}

/// Link refresh obtained mid-download; unlike [`ContentPatch`] it leaves the
/// album association alone.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRefresh {
    pub id: String,
    pub base_url: String,
    pub download_url: String,
}

/// Whether an upsert created a row or patched an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Refreshed,
}

/// Counts returned by a batched content upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: u64,
    pub refreshed: u64,
}

/// Proof that one artifact was written. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub local_filepath: PathBuf,
    pub local_filename: String,
    pub content_id: String,
    pub timestamp: DateTime<Utc>,
    pub download_run_id: Uuid,
}

impl DownloadRecord {
    pub fn new(content_id: &str, local_filepath: &Path, download_run_id: Uuid) -> Self {
        let local_filename = local_filepath
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            local_filepath: local_filepath.to_path_buf(),
            local_filename,
            content_id: content_id.to_string(),
            timestamp: Utc::now(),
            download_run_id,
        }
    }
}

/// Parameters for a download run, written before any fetch starts.
#[derive(Debug, Clone)]
pub struct NewDownloadRun {
    pub base_filepath: PathBuf,
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub album_ids: Vec<String>,
}

/// One invocation of the download phase.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRun {
    pub id: Uuid,
    pub base_filepath: PathBuf,
    pub album_ids: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_downloaded: u64,
    pub items_failed: u64,
    pub interrupted: bool,
}

/// Final tallies written when a run finishes or is interrupted.
#[derive(Debug, Clone, Default)]
pub struct DownloadRunStats {
    pub items_downloaded: u64,
    pub items_failed: u64,
    pub interrupted: bool,
}

/// Snapshot used by the `status` command.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub albums: u64,
    pub content: u64,
    pub photos: u64,
    pub videos: u64,
    pub downloads: u64,
    pub download_runs: u64,
    pub last_run: Option<DownloadRun>,
}
