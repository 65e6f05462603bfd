//! gpsync: incremental Google Photos mirror.
//!
//! Albums and their media items are indexed into a local SQLite database,
//! then every indexed item not yet recorded under the destination directory
//! is fetched and written to `{directory}/{album}/{filename}`. Progress is
//! committed per batch, so an interrupted run resumes where it stopped.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod download;
mod index;
mod photos;
mod retry;
mod shutdown;
mod sync;
mod types;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::Config;
use index::{LocalIndex, SqliteIndex};
use photos::GooglePhotosClient;
use sync::Indexer;

/// Build the API client from the credentials file named in `config`.
async fn connect(config: &Config) -> anyhow::Result<GooglePhotosClient> {
    let creds = auth::load_credentials(&config.credentials).await?;
    tracing::debug!(scopes = ?creds.scopes, "Loaded credentials");
    let client = GooglePhotosClient::new(
        creds.access_token(),
        config.api_base_url.clone(),
        config.retry_config(),
        config.request_timeout(),
    )?;
    Ok(client)
}

/// Run both indexing phases: album listing, then content of every known album.
async fn index_library(
    catalog: &GooglePhotosClient,
    index: &SqliteIndex,
    config: &Config,
) -> anyhow::Result<()> {
    let mut indexer = Indexer::new(catalog, index);
    if config.no_shared_albums {
        indexer = indexer.without_shared_albums();
    }

    let albums = indexer.index_albums(&config.albums).await?;
    tracing::info!(
        listed = albums.listed,
        matched = albums.matched,
        inserted = albums.inserted,
        "Album index updated"
    );

    let content = indexer.index_all_album_content().await?;
    tracing::info!(
        albums = content.albums,
        inserted = content.inserted,
        refreshed = content.refreshed,
        "Content index updated"
    );
    Ok(())
}

async fn run_index(args: cli::IndexArgs) -> anyhow::Result<()> {
    let config = Config::from_index_args(args);
    tracing::debug!(?config, "Resolved configuration");

    let client = connect(&config).await?;
    let index = SqliteIndex::open(&config.db_path).await?;
    tracing::debug!("Using index at {}", index.path().display());
    index_library(&client, &index, &config).await
}

async fn run_download(args: cli::DownloadArgs) -> anyhow::Result<()> {
    let config = Config::from_download_args(args)?;
    tracing::debug!(?config, "Resolved configuration");
    let download_config = config.download_config()?;
    tracing::info!(
        concurrency = download_config.concurrency,
        directory = %download_config.base_path.display(),
        "Starting gpsync"
    );

    let client = connect(&config).await?;
    let index = SqliteIndex::open(&config.db_path).await?;
    tracing::debug!("Using index at {}", index.path().display());
    let shutdown_token = shutdown::install_signal_handler();

    index_library(&client, &index, &config).await?;
    if shutdown_token.is_cancelled() {
        tracing::info!("Shutdown requested, skipping downloads");
        return Ok(());
    }

    let stats =
        download::download_indexed_content(&client, &index, &download_config, None, shutdown_token)
            .await?;

    if stats.failed > 0 {
        anyhow::bail!(
            "{} of {} items failed and remain pending; rerun to retry them",
            stats.failed,
            stats.pending
        );
    }
    Ok(())
}

async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let db_path = config::expand_tilde(&args.db_path);

    if !db_path.exists() {
        println!("No index found at {}", db_path.display());
        println!("Run `gpsync index` or `gpsync download` first.");
        return Ok(());
    }

    let index = SqliteIndex::open(&db_path).await?;
    let summary = index.summary().await?;

    println!("Index: {}", db_path.display());
    println!();
    println!("Albums:    {}", summary.albums);
    println!("Content:   {}", summary.content);
    println!("  Photos:  {}", summary.photos);
    println!("  Videos:  {}", summary.videos);
    println!("Downloads: {}", summary.downloads);
    println!("Runs:      {}", summary.download_runs);

    if let Some(dir) = &args.directory {
        let base = config::absolute_dir(dir)?;
        let done = index.downloaded_content_ids(&base).await?;
        println!();
        println!("Under {}:", base.display());
        println!("  Downloaded: {}", done.len());
        println!(
            "  Pending:    {}",
            summary.content.saturating_sub(done.len() as u64)
        );
    }

    if let Some(run) = &summary.last_run {
        println!();
        println!("Last run {}:", run.id);
        println!("  Directory: {}", run.base_filepath.display());
        println!(
            "  Window:    {} .. {}",
            run.start_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            run.end_date
        );
        println!(
            "  Started:   {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        match run.completed_at {
            Some(completed) => println!(
                "  Completed: {}{}",
                completed.format("%Y-%m-%d %H:%M:%S UTC"),
                if run.interrupted { " (interrupted)" } else { "" }
            ),
            None => println!("  Completed: never"),
        }
        println!(
            "  Items:     {} downloaded, {} failed",
            run.items_downloaded, run.items_failed
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Download(args) => run_download(args).await,
        Command::Index(args) => run_index(args).await,
        Command::Status(args) => run_status(args).await,
    }
}
