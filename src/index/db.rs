//! Local index trait and SQLite implementation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::error::IndexError;
use super::schema;
use super::types::{
    AlbumRecord, ContentRecord, DownloadRecord, DownloadRun, DownloadRunStats, IndexSummary,
    NewDownloadRun, UpsertCounts, UpsertOutcome, UrlRefresh, UNFILED_ALBUM_DIR,
};
use crate::photos::types::VideoProcessingStatus;
use crate::photos::MediaKind;

/// Durable store of albums, content, downloads, and download runs.
///
/// Object-safe so the run can hold it as `Arc<dyn LocalIndex>`. Only the
/// orchestrating control flow writes; download workers never touch it.
#[async_trait]
pub trait LocalIndex: Send + Sync {
    async fn get_album(&self, id: &str) -> Result<Option<AlbumRecord>, IndexError>;

    /// Insert the album unless a row with its id already exists.
    ///
    /// Returns `true` when a row was inserted. Existing rows (and titles) are
    /// never overwritten.
    async fn insert_album_if_absent(&self, album: &AlbumRecord) -> Result<bool, IndexError>;

    async fn album_ids(&self) -> Result<Vec<String>, IndexError>;

    async fn get_content(&self, id: &str) -> Result<Option<ContentRecord>, IndexError>;

    /// Insert a new content row, or patch only the volatile URL fields and the
    /// album association of an existing one.
    async fn upsert_content(&self, record: &ContentRecord) -> Result<UpsertOutcome, IndexError>;

    /// [`LocalIndex::upsert_content`] for many records in one transaction.
    async fn upsert_content_batch(
        &self,
        records: &[ContentRecord],
    ) -> Result<UpsertCounts, IndexError>;

    /// All content rows in indexing order.
    async fn list_content(&self) -> Result<Vec<ContentRecord>, IndexError>;

    /// Content rows for the given ids, in the order requested. Unknown ids
    /// are skipped.
    async fn list_content_by_ids(&self, ids: &[String]) -> Result<Vec<ContentRecord>, IndexError>;

    /// Download records whose local path lies under `base_path`.
    async fn downloads_under(&self, base_path: &Path) -> Result<Vec<DownloadRecord>, IndexError>;

    /// Ids of content already downloaded somewhere under `base_path`.
    async fn downloaded_content_ids(&self, base_path: &Path)
        -> Result<HashSet<String>, IndexError>;

    /// Title of the album the item is filed under, or [`UNFILED_ALBUM_DIR`].
    async fn album_title_for_content(&self, content_id: &str) -> Result<String, IndexError>;

    /// Create the run row (and its album links) before any fetch happens.
    async fn start_download_run(&self, run: &NewDownloadRun) -> Result<DownloadRun, IndexError>;

    /// Atomically record one batch of successful downloads together with any
    /// links refreshed while fetching that batch.
    async fn commit_download_batch(
        &self,
        downloads: &[DownloadRecord],
        refreshes: &[UrlRefresh],
    ) -> Result<(), IndexError>;

    async fn complete_download_run(
        &self,
        run_id: Uuid,
        stats: &DownloadRunStats,
    ) -> Result<(), IndexError>;

    #[cfg(test)]
    async fn get_download_run(&self, run_id: Uuid) -> Result<Option<DownloadRun>, IndexError>;

    async fn summary(&self) -> Result<IndexSummary, IndexError>;
}

const CONTENT_COLUMNS: &str = "id, album_id, base_url, download_url, filename, mime_type, media_type, creation_time, width, height, description, fps, processing_status, created_at, updated_at";

const RUN_COLUMNS: &str = "id, base_filepath, start_date, end_date, started_at, completed_at, items_downloaded, items_failed, interrupted";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite implementation of the local index.
pub struct SqliteIndex {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Open or create an index at the given path.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|source| IndexError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
            }

            let mut conn = Connection::open(&path_clone).map_err(|e| IndexError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;

            schema::migrate(&mut conn)?;

            Ok::<_, IndexError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory index (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let mut conn = Connection::open_in_memory().map_err(|e| IndexError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::Poisoned)
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_date(column: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| conversion_error(column, format!("bad date {s:?}: {e}")))
}

fn parse_uuid(column: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(column, format!("bad uuid {s:?}: {e}")))
}

fn row_to_content(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentRecord> {
    let media_type: String = row.get(6)?;
    let media_kind = MediaKind::from_str(&media_type)
        .ok_or_else(|| conversion_error(6, format!("unknown media type {media_type:?}")))?;
    let processing_status: Option<String> = row.get(12)?;

    Ok(ContentRecord {
        id: row.get(0)?,
        album_id: row.get(1)?,
        base_url: row.get(2)?,
        download_url: row.get(3)?,
        filename: row.get(4)?,
        mime_type: row.get(5)?,
        media_kind,
        creation_time: from_ts(row.get(7)?),
        width: row.get(8)?,
        height: row.get(9)?,
        description: row.get(10)?,
        fps: row.get(11)?,
        processing_status: processing_status
            .as_deref()
            .and_then(VideoProcessingStatus::from_str),
        created_at: from_ts(row.get(13)?),
        updated_at: from_ts(row.get(14)?),
    })
}

fn row_to_download(row: &rusqlite::Row<'_>) -> rusqlite::Result<DownloadRecord> {
    let local_filepath: String = row.get(0)?;
    let run_id: String = row.get(4)?;
    Ok(DownloadRecord {
        local_filepath: PathBuf::from(local_filepath),
        local_filename: row.get(1)?,
        content_id: row.get(2)?,
        timestamp: from_ts(row.get(3)?),
        download_run_id: parse_uuid(4, &run_id)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<DownloadRun> {
    let id: String = row.get(0)?;
    let base_filepath: String = row.get(1)?;
    let start_date: Option<String> = row.get(2)?;
    let end_date: String = row.get(3)?;
    let completed_at: Option<i64> = row.get(5)?;
    let items_downloaded: i64 = row.get(6)?;
    let items_failed: i64 = row.get(7)?;
    let interrupted: i64 = row.get(8)?;

    Ok(DownloadRun {
        id: parse_uuid(0, &id)?,
        base_filepath: PathBuf::from(base_filepath),
        album_ids: Vec::new(),
        start_date: start_date.as_deref().map(|s| parse_date(2, s)).transpose()?,
        end_date: parse_date(3, &end_date)?,
        started_at: from_ts(row.get(4)?),
        completed_at: completed_at.map(from_ts),
        items_downloaded: items_downloaded as u64,
        items_failed: items_failed as u64,
        interrupted: interrupted != 0,
    })
}

/// Patch-or-insert for one content row. The patch touches only the volatile
/// URL fields and the album association.
fn upsert_content_row(
    conn: &Connection,
    record: &ContentRecord,
    now: i64,
) -> rusqlite::Result<UpsertOutcome> {
    let patch = record.url_patch();
    let patched = conn
        .prepare_cached(
            "UPDATE content SET album_id = ?1, base_url = ?2, download_url = ?3, updated_at = ?4 WHERE id = ?5",
        )?
        .execute(params![
            patch.album_id,
            patch.base_url,
            patch.download_url,
            now,
            patch.id
        ])?;
    if patched > 0 {
        return Ok(UpsertOutcome::Refreshed);
    }

    conn.prepare_cached(&format!(
        "INSERT INTO content ({CONTENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
    ))?
    .execute(params![
        record.id,
        record.album_id,
        record.base_url,
        record.download_url,
        record.filename,
        record.mime_type,
        record.media_kind.as_str(),
        record.creation_time.timestamp(),
        record.width,
        record.height,
        record.description,
        record.fps,
        record.processing_status.map(|s| s.as_str()),
        record.created_at.timestamp(),
        now,
    ])?;
    Ok(UpsertOutcome::Inserted)
}

fn downloads_under_conn(
    conn: &Connection,
    base_path: &Path,
) -> rusqlite::Result<Vec<DownloadRecord>> {
    let prefix = base_path.to_string_lossy().into_owned();
    // String prefix narrows the scan; Path::starts_with then rejects
    // siblings such as "/out2" for a base of "/out".
    let mut stmt = conn.prepare_cached(
        "SELECT local_filepath, local_filename, content_id, timestamp, download_run_id FROM download WHERE substr(local_filepath, 1, length(?1)) = ?1",
    )?;
    let rows = stmt
        .query_map([&prefix], row_to_download)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .filter(|d| d.local_filepath.starts_with(base_path))
        .collect())
}

fn run_album_ids(conn: &Connection, run_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT album_id FROM album_download_run_link WHERE download_run_id = ?1 ORDER BY album_id",
    )?;
    let ids = stmt
        .query_map([run_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

fn count(conn: &Connection, sql: &str) -> Result<u64, IndexError> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(IndexError::query)
}

#[async_trait]
impl LocalIndex for SqliteIndex {
    async fn get_album(&self, id: &str) -> Result<Option<AlbumRecord>, IndexError> {
        let conn = self.lock()?;
        conn.query_row("SELECT id, title FROM album WHERE id = ?1", [id], |row| {
            Ok(AlbumRecord {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })
        .optional()
        .map_err(IndexError::query)
    }

    async fn insert_album_if_absent(&self, album: &AlbumRecord) -> Result<bool, IndexError> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO album (id, title) VALUES (?1, ?2)",
                params![album.id, album.title],
            )
            .map_err(IndexError::query)?;
        Ok(inserted > 0)
    }

    async fn album_ids(&self) -> Result<Vec<String>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT id FROM album ORDER BY rowid")
            .map_err(IndexError::query)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(IndexError::query)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(IndexError::query)?;
        Ok(ids)
    }

    async fn get_content(&self, id: &str) -> Result<Option<ContentRecord>, IndexError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {CONTENT_COLUMNS} FROM content WHERE id = ?1"),
            [id],
            row_to_content,
        )
        .optional()
        .map_err(IndexError::query)
    }

    async fn upsert_content(&self, record: &ContentRecord) -> Result<UpsertOutcome, IndexError> {
        let conn = self.lock()?;
        upsert_content_row(&conn, record, Utc::now().timestamp()).map_err(IndexError::query)
    }

    async fn upsert_content_batch(
        &self,
        records: &[ContentRecord],
    ) -> Result<UpsertCounts, IndexError> {
        if records.is_empty() {
            return Ok(UpsertCounts::default());
        }

        let mut conn = self.lock()?;
        let now = Utc::now().timestamp();
        let tx = conn.transaction().map_err(IndexError::query)?;

        let mut counts = UpsertCounts::default();
        for record in records {
            match upsert_content_row(&tx, record, now).map_err(IndexError::query)? {
                UpsertOutcome::Inserted => counts.inserted += 1,
                UpsertOutcome::Refreshed => counts.refreshed += 1,
            }
        }

        tx.commit().map_err(IndexError::query)?;
        Ok(counts)
    }

    async fn list_content(&self) -> Result<Vec<ContentRecord>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {CONTENT_COLUMNS} FROM content ORDER BY rowid"))
            .map_err(IndexError::query)?;
        let records = stmt
            .query_map([], row_to_content)
            .map_err(IndexError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(IndexError::query)?;
        Ok(records)
    }

    async fn list_content_by_ids(&self, ids: &[String]) -> Result<Vec<ContentRecord>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {CONTENT_COLUMNS} FROM content WHERE id = ?1"))
            .map_err(IndexError::query)?;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match stmt
                .query_row([id], row_to_content)
                .optional()
                .map_err(IndexError::query)?
            {
                Some(record) => records.push(record),
                None => tracing::warn!(id = %id, "Requested content is not indexed, skipping"),
            }
        }
        Ok(records)
    }

    async fn downloads_under(&self, base_path: &Path) -> Result<Vec<DownloadRecord>, IndexError> {
        let conn = self.lock()?;
        downloads_under_conn(&conn, base_path).map_err(IndexError::query)
    }

    async fn downloaded_content_ids(
        &self,
        base_path: &Path,
    ) -> Result<HashSet<String>, IndexError> {
        let conn = self.lock()?;
        let ids = downloads_under_conn(&conn, base_path)
            .map_err(IndexError::query)?
            .into_iter()
            .map(|d| d.content_id)
            .collect();
        Ok(ids)
    }

    async fn album_title_for_content(&self, content_id: &str) -> Result<String, IndexError> {
        let conn = self.lock()?;
        let title: Option<Option<String>> = conn
            .query_row(
                "SELECT album.title FROM content JOIN album ON album.id = content.album_id WHERE content.id = ?1",
                [content_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(IndexError::query)?;
        Ok(title
            .flatten()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNFILED_ALBUM_DIR.to_string()))
    }

    async fn start_download_run(&self, run: &NewDownloadRun) -> Result<DownloadRun, IndexError> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let id_str = id.to_string();

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(IndexError::query)?;
        tx.execute(
            "INSERT INTO download_run (id, base_filepath, start_date, end_date, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id_str,
                run.base_filepath.to_string_lossy(),
                run.start_date.map(|d| d.format(DATE_FORMAT).to_string()),
                run.end_date.format(DATE_FORMAT).to_string(),
                started_at.timestamp(),
            ],
        )
        .map_err(IndexError::query)?;
        {
            let mut link = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO album_download_run_link (album_id, download_run_id) VALUES (?1, ?2)",
                )
                .map_err(IndexError::query)?;
            for album_id in &run.album_ids {
                link.execute(params![album_id, id_str])
                    .map_err(IndexError::query)?;
            }
        }
        tx.commit().map_err(IndexError::query)?;

        Ok(DownloadRun {
            id,
            base_filepath: run.base_filepath.clone(),
            album_ids: run.album_ids.clone(),
            start_date: run.start_date,
            end_date: run.end_date,
            started_at: from_ts(started_at.timestamp()),
            completed_at: None,
            items_downloaded: 0,
            items_failed: 0,
            interrupted: false,
        })
    }

    async fn commit_download_batch(
        &self,
        downloads: &[DownloadRecord],
        refreshes: &[UrlRefresh],
    ) -> Result<(), IndexError> {
        if downloads.is_empty() && refreshes.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let now = Utc::now().timestamp();
        let tx = conn.transaction().map_err(IndexError::query)?;
        {
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO download (local_filepath, local_filename, content_id, timestamp, download_run_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(IndexError::query)?;
            for d in downloads {
                insert
                    .execute(params![
                        d.local_filepath.to_string_lossy(),
                        d.local_filename,
                        d.content_id,
                        d.timestamp.timestamp(),
                        d.download_run_id.to_string(),
                    ])
                    .map_err(IndexError::query)?;
            }

            let mut refresh = tx
                .prepare_cached(
                    "UPDATE content SET base_url = ?1, download_url = ?2, updated_at = ?3 WHERE id = ?4",
                )
                .map_err(IndexError::query)?;
            for r in refreshes {
                refresh
                    .execute(params![r.base_url, r.download_url, now, r.id])
                    .map_err(IndexError::query)?;
            }
        }
        tx.commit().map_err(IndexError::query)?;
        Ok(())
    }

    async fn complete_download_run(
        &self,
        run_id: Uuid,
        stats: &DownloadRunStats,
    ) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE download_run SET completed_at = ?1, items_downloaded = ?2, items_failed = ?3, interrupted = ?4 WHERE id = ?5",
            params![
                Utc::now().timestamp(),
                stats.items_downloaded as i64,
                stats.items_failed as i64,
                i64::from(stats.interrupted),
                run_id.to_string(),
            ],
        )
        .map_err(IndexError::query)?;
        Ok(())
    }

    #[cfg(test)]
    async fn get_download_run(&self, run_id: Uuid) -> Result<Option<DownloadRun>, IndexError> {
        let conn = self.lock()?;
        let id_str = run_id.to_string();
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM download_run WHERE id = ?1"),
                [&id_str],
                row_to_run,
            )
            .optional()
            .map_err(IndexError::query)?;
        match run {
            Some(mut run) => {
                run.album_ids = run_album_ids(&conn, &id_str).map_err(IndexError::query)?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    async fn summary(&self) -> Result<IndexSummary, IndexError> {
        let conn = self.lock()?;

        let mut kinds: HashMap<String, u64> = HashMap::new();
        {
            let mut stmt = conn
                .prepare("SELECT media_type, COUNT(*) FROM content GROUP BY media_type")
                .map_err(IndexError::query)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(IndexError::query)?;
            for row in rows {
                let (kind, n) = row.map_err(IndexError::query)?;
                kinds.insert(kind, n as u64);
            }
        }

        let last_run = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM download_run ORDER BY started_at DESC, rowid DESC LIMIT 1"
                ),
                [],
                row_to_run,
            )
            .optional()
            .map_err(IndexError::query)?;
        let last_run = match last_run {
            Some(mut run) => {
                run.album_ids =
                    run_album_ids(&conn, &run.id.to_string()).map_err(IndexError::query)?;
                Some(run)
            }
            None => None,
        };

        Ok(IndexSummary {
            albums: count(&conn, "SELECT COUNT(*) FROM album")?,
            content: count(&conn, "SELECT COUNT(*) FROM content")?,
            photos: kinds.get(MediaKind::Photo.as_str()).copied().unwrap_or(0),
            videos: kinds.get(MediaKind::Video.as_str()).copied().unwrap_or(0),
            downloads: count(&conn, "SELECT COUNT(*) FROM download")?,
            download_runs: count(&conn, "SELECT COUNT(*) FROM download_run")?,
            last_run,
        })
    }
}
