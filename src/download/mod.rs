//! Download engine. Indexed content that has no download record under the
//! destination is split into fixed-size batches; each batch is fetched with
//! bounded concurrency and committed to the index as a unit once every item
//! in it has finished, so an interruption never leaves half a batch recorded.

pub mod error;
pub mod exif;
pub mod fetch;
pub mod paths;
pub mod persist;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::index::{
    ContentRecord, DownloadRecord, DownloadRunStats, LocalIndex, NewDownloadRun, UrlRefresh,
};
use crate::photos::RemoteCatalog;

pub use error::DownloadError;
pub use fetch::{fetch_item, FetchedContent};

/// Subset of application config consumed by the download engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub(crate) base_path: PathBuf,
    pub(crate) batch_size: usize,
    pub(crate) concurrency: usize,
    pub(crate) start_date: Option<NaiveDate>,
    pub(crate) end_date: Option<NaiveDate>,
    pub(crate) dry_run: bool,
    pub(crate) no_progress_bar: bool,
}

/// Tallies for one invocation of the download phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub considered: usize,
    pub already_downloaded: usize,
    pub out_of_range: usize,
    pub pending: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// An item paired with the path it will be written to.
struct PlannedItem {
    item: ContentRecord,
    dest: PathBuf,
}

fn in_date_window(item: &ContentRecord, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    let day = item.creation_time.date_naive();
    start.map_or(true, |s| day >= s) && end.map_or(true, |e| day <= e)
}

/// Resolve destinations for the pending items, in order.
///
/// A path already recorded for another item, or claimed earlier in this run,
/// gets the id suffix.
async fn plan_destinations(
    index: &dyn LocalIndex,
    config: &DownloadConfig,
    items: Vec<ContentRecord>,
) -> Result<Vec<PlannedItem>> {
    let mut taken: HashSet<PathBuf> = index
        .downloads_under(&config.base_path)
        .await?
        .into_iter()
        .map(|d| d.local_filepath)
        .collect();

    let mut planned = Vec::with_capacity(items.len());
    for item in items {
        let album_title = index.album_title_for_content(&item.id).await?;
        let mut dest = paths::destination_path(
            &config.base_path,
            &album_title,
            &item.filename,
            &item.id,
            &item.mime_type,
        );
        if taken.contains(&dest) {
            let deduped = paths::disambiguated_path(&dest, &item.id);
            tracing::debug!(
                "Path collision: {} is taken, using {}",
                dest.display(),
                deduped.display()
            );
            dest = deduped;
        }
        taken.insert(dest.clone());
        planned.push(PlannedItem { item, dest });
    }
    Ok(planned)
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY (e.g. piped output, cron jobs).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// Fetch and write one item. Returns the refreshed link, if the stored one
/// had expired.
async fn download_one(
    catalog: &dyn RemoteCatalog,
    planned: &PlannedItem,
) -> Result<Option<UrlRefresh>, DownloadError> {
    tracing::debug!(
        id = %planned.item.id,
        path = %planned.dest.display(),
        "downloading",
    );
    let fetched = fetch_item(catalog, &planned.item).await?;
    persist::persist(&fetched.content, &planned.item, &planned.dest).await?;
    Ok(fetched.refreshed)
}

/// Entry point for the download engine.
///
/// Downloads every indexed item (or only `subset`, when given) that has no
/// download record under the configured base path. The run row is written
/// before the first fetch. Per-item failures are logged and leave the item
/// pending for the next run; an item whose metadata is neither photo nor video
/// aborts the run after the current batch is committed.
pub async fn download_indexed_content(
    catalog: &dyn RemoteCatalog,
    index: &dyn LocalIndex,
    config: &DownloadConfig,
    subset: Option<&[String]>,
    shutdown_token: CancellationToken,
) -> Result<DownloadStats> {
    let started = Instant::now();
    let mut stats = DownloadStats::default();

    let items = match subset {
        Some(ids) => index.list_content_by_ids(ids).await?,
        None => index.list_content().await?,
    };
    stats.considered = items.len();

    let done = index.downloaded_content_ids(&config.base_path).await?;
    let mut pending = Vec::with_capacity(items.len());
    for item in items {
        if done.contains(&item.id) {
            stats.already_downloaded += 1;
        } else if !in_date_window(&item, config.start_date, config.end_date) {
            stats.out_of_range += 1;
        } else {
            pending.push(item);
        }
    }
    stats.pending = pending.len();

    let planned = plan_destinations(index, config, pending).await?;

    if config.dry_run {
        for p in &planned {
            tracing::info!("[DRY RUN] Would download {}", p.dest.display());
        }
        tracing::info!("── Dry Run Summary ──");
        tracing::info!(
            "  {} items would be downloaded ({} already downloaded, {} outside date range)",
            stats.pending,
            stats.already_downloaded,
            stats.out_of_range
        );
        tracing::info!("  destination: {}", config.base_path.display());
        return Ok(stats);
    }

    let run = index
        .start_download_run(&NewDownloadRun {
            base_filepath: config.base_path.clone(),
            start_date: config.start_date,
            end_date: config
                .end_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            album_ids: index.album_ids().await?,
        })
        .await?;
    tracing::debug!(run = %run.id, "Started download run");

    if planned.is_empty() {
        tracing::info!("No new items to download");
    }

    let pb = create_progress_bar(config.no_progress_bar, planned.len() as u64);
    let batch_size = config.batch_size.max(1);
    let concurrency = config.concurrency.max(1);
    let mut fatal: Option<DownloadError> = None;

    for (batch_no, batch) in planned.chunks(batch_size).enumerate() {
        if shutdown_token.is_cancelled() {
            pb.suspend(|| tracing::info!("Shutdown requested, not starting further batches"));
            stats.interrupted = true;
            break;
        }

        let results: Vec<(&PlannedItem, Result<Option<UrlRefresh>, DownloadError>)> =
            stream::iter(batch)
                .map(|planned| async move { (planned, download_one(catalog, planned).await) })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut records = Vec::with_capacity(results.len());
        let mut refreshes = Vec::new();
        for (planned, result) in results {
            pb.set_message(planned.item.filename.clone());
            match result {
                Ok(refreshed) => {
                    records.push(DownloadRecord::new(&planned.item.id, &planned.dest, run.id));
                    refreshes.extend(refreshed);
                    stats.downloaded += 1;
                }
                Err(e) if e.is_skippable() => {
                    pb.suspend(|| {
                        tracing::error!("Download failed: {}: {}", planned.item.filename, e);
                    });
                    stats.failed += 1;
                }
                Err(e) => {
                    stats.failed += 1;
                    fatal.get_or_insert(e);
                }
            }
            pb.inc(1);
        }

        index.commit_download_batch(&records, &refreshes).await?;
        tracing::debug!(
            "Batch {}: committed {} downloads, {} refreshed links",
            batch_no + 1,
            records.len(),
            refreshes.len()
        );

        if fatal.is_some() {
            stats.interrupted = true;
            break;
        }
    }
    pb.finish_and_clear();

    index
        .complete_download_run(
            run.id,
            &DownloadRunStats {
                items_downloaded: stats.downloaded as u64,
                items_failed: stats.failed as u64,
                interrupted: stats.interrupted,
            },
        )
        .await?;

    if let Some(e) = fatal {
        return Err(e.into());
    }

    tracing::info!("── Summary ──");
    if stats.interrupted {
        tracing::info!("  Interrupted before all batches finished");
    }
    tracing::info!(
        "  {} downloaded, {} failed, {} already downloaded, {} outside date range",
        stats.downloaded,
        stats.failed,
        stats.already_downloaded,
        stats.out_of_range
    );
    tracing::info!("  destination: {}", config.base_path.display());
    tracing::info!("  elapsed: {}", format_duration(started.elapsed()));

    Ok(stats)
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
