//! Index tables and their migrations.
//!
//! The applied version lives in `PRAGMA user_version`. Each entry of
//! [`MIGRATIONS`] moves the schema up by one version and runs in its own
//! transaction together with the version bump.

use rusqlite::Connection;

use super::error::IndexError;

/// Albums, content, downloads, download runs, and the run/album link table.
const SCHEMA_V1: &str = r#"
CREATE TABLE album (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT
);

CREATE TABLE content (
    id TEXT PRIMARY KEY NOT NULL,
    album_id TEXT REFERENCES album(id),
    base_url TEXT NOT NULL,
    download_url TEXT NOT NULL,
    filename TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    media_type TEXT NOT NULL,
    creation_time INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    description TEXT,
    fps REAL,
    processing_status TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX idx_content_album_id ON content(album_id);

CREATE TABLE download_run (
    id TEXT PRIMARY KEY NOT NULL,
    base_filepath TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    items_downloaded INTEGER DEFAULT 0,
    items_failed INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);

CREATE TABLE download (
    local_filepath TEXT PRIMARY KEY NOT NULL,
    local_filename TEXT NOT NULL,
    content_id TEXT NOT NULL REFERENCES content(id),
    timestamp INTEGER NOT NULL,
    download_run_id TEXT NOT NULL REFERENCES download_run(id)
);

CREATE INDEX idx_download_content_id ON download(content_id);

CREATE TABLE album_download_run_link (
    album_id TEXT NOT NULL REFERENCES album(id),
    download_run_id TEXT NOT NULL REFERENCES download_run(id),
    PRIMARY KEY (album_id, download_run_id)
);
"#;

const MIGRATIONS: &[&str] = &[SCHEMA_V1];

/// Version a fully migrated index reports.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

pub(crate) fn schema_version(conn: &Connection) -> Result<i32, IndexError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring `conn` up to [`SCHEMA_VERSION`]. A no-op on a current index.
pub(crate) fn migrate(conn: &mut Connection) -> Result<(), IndexError> {
    let found = schema_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(IndexError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    for (step, ddl) in MIGRATIONS.iter().enumerate().skip(found.max(0) as usize) {
        let version = step as i32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(ddl)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::debug!("Index schema migrated to v{}", version);
    }
    Ok(())
}
