use clap::{Args, Parser, Subcommand};

use crate::photos::DEFAULT_API_BASE_URL;
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "gpsync",
    version,
    about = "Incrementally mirror Google Photos albums to a local directory"
)]
pub struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, global = true, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index albums and content, then download everything not yet on disk
    Download(DownloadArgs),

    /// Refresh the local index without downloading
    Index(IndexArgs),

    /// Show what the local index knows
    Status(StatusArgs),
}

/// Flags shared by every command that talks to the Library API.
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Authorized-user JSON file holding the OAuth access token
    #[arg(long, env = "GPSYNC_CREDENTIALS")]
    pub credentials: String,

    /// Album title(s) to sync; all albums when omitted
    #[arg(short = 'a', long = "album")]
    pub albums: Vec<String>,

    /// Path of the SQLite index
    #[arg(long, default_value = "~/.gpsync/index.db")]
    pub db_path: String,

    /// Only sync albums owned by the account
    #[arg(long)]
    pub no_shared_albums: bool,

    /// Retries for rate-limited or failed API calls (0 disables)
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Initial retry delay in seconds
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Total timeout in seconds for a single HTTP request, body included
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    #[arg(long, hide = true, default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Local directory downloads are written under
    #[arg(short = 'd', long)]
    pub directory: String,

    /// Number of concurrent downloads per batch
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads_num: u16,

    /// Items fetched before each index commit
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: u32,

    /// Skip items created before this ISO date or interval (e.g., 2024-01-02 or 30d)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Skip items created after this ISO date or interval (default: today)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Log destinations without fetching or recording anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Path of the SQLite index
    #[arg(long, default_value = "~/.gpsync/index.db")]
    pub db_path: String,

    /// Also count items not yet downloaded under this directory
    #[arg(short = 'd', long)]
    pub directory: Option<String>,
}
