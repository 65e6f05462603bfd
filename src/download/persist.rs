//! Writing fetched artifacts to their destination.

use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use super::exif;
use super::fetch::FetchedContent;
use super::paths;
use crate::index::ContentRecord;
use crate::photos::MediaKind;

/// Temporary sibling the bytes are written to before the final rename.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Write `content` to `dest`, creating the album directory on demand.
///
/// The file only appears under its final name once fully written. Photos are
/// stored in their original encoding; JPEGs additionally get the item
/// description as EXIF. Failures after the rename (mtime, EXIF) are logged
/// and do not fail the item.
pub async fn persist(
    content: &FetchedContent,
    item: &ContentRecord,
    dest: &Path,
) -> Result<(), DownloadError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part = part_path(dest);
    let write = async {
        let mut file = fs::File::create(&part).await?;
        file.write_all(content.bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(&part, dest).await
    };
    if let Err(e) = write.await {
        let _ = fs::remove_file(&part).await;
        return Err(DownloadError::Disk(e));
    }

    let mtime_path = dest.to_path_buf();
    let ts = item.creation_time.timestamp();
    match tokio::task::spawn_blocking(move || set_file_mtime(&mtime_path, ts)).await {
        Ok(Err(e)) => tracing::warn!("Could not set mtime on {}: {}", dest.display(), e),
        Err(e) => tracing::warn!("mtime task panicked: {}", e),
        Ok(Ok(())) => {}
    }

    if let (MediaKind::Photo, Some(description)) = (content.kind(), &item.description) {
        if paths::is_jpeg(dest) {
            let exif_path = dest.to_path_buf();
            let description = description.clone();
            let exif_result = tokio::task::spawn_blocking(move || {
                if let Err(e) = exif::set_description(&exif_path, &description) {
                    tracing::warn!("Failed to set EXIF on {}: {:#}", exif_path.display(), e);
                }
            })
            .await;
            if let Err(e) = exif_result {
                tracing::warn!("EXIF task panicked: {}", e);
            }
        }
    }

    tracing::debug!("Wrote {}", dest.display());
    Ok(())
}

/// Set the modification and access times of a file to the given Unix
/// timestamp.
///
/// Handles negative timestamps (dates before 1970) gracefully by clamping
/// to the Unix epoch.
fn set_file_mtime(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(timestamp.unsigned_abs()))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)?;
    Ok(())
}
