//! Reconciliation of the remote library into the local index.
//!
//! Albums are indexed before their content, and all content is indexed before
//! any download starts. Both phases are additive and safe to re-run: a second
//! pass only refreshes presigned URLs and album associations.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::index::{AlbumRecord, ContentRecord, IndexError, LocalIndex, UpsertCounts};
use crate::photos::{self, PhotosError, RemoteCatalog};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Photos(#[from] PhotosError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Album {0} is not in the local index")]
    UnknownAlbum(String),
}

/// Outcome of one album listing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlbumIndexStats {
    pub listed: usize,
    pub matched: usize,
    pub inserted: usize,
}

/// Outcome of indexing the content of every known album.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentIndexStats {
    pub albums: usize,
    pub inserted: u64,
    pub refreshed: u64,
}

/// Drives both indexing phases against one catalog and one index.
pub struct Indexer<'a> {
    catalog: &'a dyn RemoteCatalog,
    index: &'a dyn LocalIndex,
    include_shared: bool,
}

impl<'a> Indexer<'a> {
    pub fn new(catalog: &'a dyn RemoteCatalog, index: &'a dyn LocalIndex) -> Self {
        Self {
            catalog,
            index,
            include_shared: true,
        }
    }

    /// Restrict album listing to the user's own albums.
    pub fn without_shared_albums(mut self) -> Self {
        self.include_shared = false;
        self
    }

    /// List remote albums and insert the ones not yet known.
    ///
    /// An empty `title_filter` keeps every album; otherwise only albums whose
    /// title matches one of the entries exactly. Existing rows are left alone.
    pub async fn index_albums(&self, title_filter: &[String]) -> Result<AlbumIndexStats, SyncError> {
        let albums = photos::list_all_albums(self.catalog, self.include_shared).await?;
        let mut stats = AlbumIndexStats {
            listed: albums.len(),
            ..Default::default()
        };

        let selected: Vec<_> = albums
            .iter()
            .filter(|album| {
                title_filter.is_empty()
                    || album
                        .title
                        .as_deref()
                        .is_some_and(|t| title_filter.iter().any(|f| f == t))
            })
            .collect();
        stats.matched = selected.len();

        for wanted in title_filter {
            if !selected
                .iter()
                .any(|a| a.title.as_deref() == Some(wanted.as_str()))
            {
                warn!("No remote album titled {:?}", wanted);
            }
        }

        for album in selected {
            if self
                .index
                .insert_album_if_absent(&AlbumRecord::from(album))
                .await?
            {
                debug!(id = %album.id, title = ?album.title, "Indexed new album");
                stats.inserted += 1;
            }
        }

        info!(
            "Albums: {} listed, {} selected, {} new",
            stats.listed, stats.matched, stats.inserted
        );
        Ok(stats)
    }

    /// Index the non-archived items of one known album.
    ///
    /// New items are inserted; items already indexed get fresh URLs and are
    /// re-associated with this album, so the last album indexed wins for an
    /// item that appears in several.
    pub async fn index_album_content(&self, album_id: &str) -> Result<UpsertCounts, SyncError> {
        let album = self
            .index
            .get_album(album_id)
            .await?
            .ok_or_else(|| SyncError::UnknownAlbum(album_id.to_string()))?
            .to_remote();

        let items = photos::search_all_album_media_items(self.catalog, &album.id).await?;
        let records = items
            .iter()
            .map(|item| ContentRecord::from_media_item(item, Some(&album.id)))
            .collect::<Result<Vec<_>, _>>()?;

        let counts = self.index.upsert_content_batch(&records).await?;
        debug!(
            album = %album.id,
            title = ?album.title,
            "{} items: {} new, {} refreshed",
            records.len(),
            counts.inserted,
            counts.refreshed
        );
        Ok(counts)
    }

    /// Index the content of every album in the local index, in insertion
    /// order. Any listing failure aborts the pass.
    pub async fn index_all_album_content(&self) -> Result<ContentIndexStats, SyncError> {
        let album_ids = self.index.album_ids().await?;
        let mut stats = ContentIndexStats::default();

        for album_id in &album_ids {
            let counts = self.index_album_content(album_id).await?;
            stats.albums += 1;
            stats.inserted += counts.inserted;
            stats.refreshed += counts.refreshed;
        }

        info!(
            "Content: {} albums, {} new items, {} refreshed",
            stats.albums, stats.inserted, stats.refreshed
        );
        Ok(stats)
    }
}
