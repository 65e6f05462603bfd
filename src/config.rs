use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use chrono::{NaiveDate, NaiveDateTime, Utc};

use crate::cli::{DownloadArgs, IndexArgs, SyncArgs};
use crate::download::DownloadConfig;
use crate::retry::RetryConfig;

/// Ceiling for the exponential API backoff.
const MAX_RETRY_DELAY_SECS: u64 = 60;

/// Application configuration resolved from the command line.
///
/// Heap types first, then the date window, then primitives, booleans last.
pub struct Config {
    pub credentials: PathBuf,
    pub db_path: PathBuf,
    pub api_base_url: String,
    pub albums: Vec<String>,
    /// Absolute download base path; `None` for `index`.
    pub directory: Option<PathBuf>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub batch_size: u32,
    pub threads_num: u16,

    pub no_shared_albums: bool,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("credentials", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("directory", &self.directory)
            .field("albums", &self.albums)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("threads_num", &self.threads_num)
            .field("batch_size", &self.batch_size)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Expand `~` and anchor relative paths at the working directory, so the
/// same directory always yields the same recorded path prefix.
pub(crate) fn absolute_dir(path: &str) -> anyhow::Result<PathBuf> {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    let cwd = std::env::current_dir().context("Cannot resolve the working directory")?;
    Ok(cwd.join(expanded))
}

impl Config {
    fn from_sync_args(sync: SyncArgs) -> Self {
        Self {
            credentials: expand_tilde(&sync.credentials),
            db_path: expand_tilde(&sync.db_path),
            api_base_url: sync.api_base_url,
            albums: sync.albums,
            directory: None,
            start_date: None,
            end_date: None,
            retry_delay_secs: sync.retry_delay,
            timeout_secs: sync.timeout,
            max_retries: sync.max_retries,
            batch_size: 1,
            threads_num: 1,
            no_shared_albums: sync.no_shared_albums,
            dry_run: false,
            no_progress_bar: true,
        }
    }

    pub fn from_index_args(args: IndexArgs) -> Self {
        Self::from_sync_args(args.sync)
    }

    pub fn from_download_args(args: DownloadArgs) -> anyhow::Result<Self> {
        let start_date = args
            .start_date
            .as_deref()
            .map(parse_date_or_interval)
            .transpose()?;
        let end_date = args
            .end_date
            .as_deref()
            .map(parse_date_or_interval)
            .transpose()?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                anyhow::bail!("--start-date {} is after --end-date {}", start, end);
            }
        }

        Ok(Self {
            directory: Some(absolute_dir(&args.directory)?),
            start_date,
            end_date,
            batch_size: args.batch_size,
            threads_num: args.threads_num,
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
            ..Self::from_sync_args(args.sync)
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_secs: self.retry_delay_secs,
            max_delay_secs: MAX_RETRY_DELAY_SECS,
        }
    }

    /// Total per-request timeout for the API client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The subset handed to the download engine.
    pub fn download_config(&self) -> anyhow::Result<DownloadConfig> {
        let base_path = self
            .directory
            .clone()
            .context("No download directory configured")?;
        Ok(DownloadConfig {
            base_path,
            batch_size: self.batch_size as usize,
            concurrency: usize::from(self.threads_num),
            start_date: self.start_date,
            end_date: self.end_date,
            dry_run: self.dry_run,
            no_progress_bar: self.no_progress_bar,
        })
    }
}

/// Parse a date argument into a calendar day.
///
/// "Today" is the UTC calendar day, matching how item creation times are
/// compared against the window.
///
/// - Relative interval: `"20d"` (20 days before today)
/// - ISO date: `"2025-01-02"`
/// - ISO datetime: `"2025-01-02T14:30:00"` (the time is dropped)
pub(crate) fn parse_date_or_interval(s: &str) -> anyhow::Result<NaiveDate> {
    parse_date_relative_to(s, Utc::now().date_naive())
}

fn parse_date_relative_to(s: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    if let Some(days_str) = s.strip_suffix('d') {
        if let Ok(days) = days_str.parse::<u32>() {
            if let Some(day) = today.checked_sub_days(chrono::Days::new(u64::from(days))) {
                return Ok(day);
            }
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    anyhow::bail!(
        "Cannot parse '{}' as a date. Expected ISO date (2025-01-02), \
         datetime (2025-01-02T14:30:00), or interval (20d)",
        s
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn download_args(extra: &[&str]) -> DownloadArgs {
        let mut argv = vec!["gpsync", "download", "--credentials", "c.json", "-d", "/photos"];
        argv.extend_from_slice(extra);
        match crate::cli::Cli::try_parse_from(argv).unwrap().command {
            crate::cli::Command::Download(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Pictures");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Pictures"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/srv/photos"), PathBuf::from("/srv/photos"));
        assert_eq!(expand_tilde("photos"), PathBuf::from("photos"));
    }

    #[test]
    fn test_absolute_dir_anchors_relative_paths() {
        let abs = absolute_dir("mirror").unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("mirror"));
        assert_eq!(absolute_dir("/srv/mirror").unwrap(), PathBuf::from("/srv/mirror"));
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_date_or_interval("2025-01-15").unwrap(), day(2025, 1, 15));
    }

    #[test]
    fn test_parse_iso_datetime_drops_time() {
        assert_eq!(
            parse_date_or_interval("2025-06-15T14:30:00").unwrap(),
            day(2025, 6, 15)
        );
    }

    #[test]
    fn test_parse_interval_days() {
        assert_eq!(
            parse_date_relative_to("10d", day(2024, 3, 5)).unwrap(),
            day(2024, 2, 24)
        );
        assert_eq!(
            parse_date_relative_to("0d", day(2024, 3, 5)).unwrap(),
            day(2024, 3, 5)
        );
    }

    #[test]
    fn test_interval_counts_from_utc_today() {
        let expected = Utc::now()
            .date_naive()
            .checked_sub_days(chrono::Days::new(3))
            .unwrap();
        let parsed = parse_date_or_interval("3d").unwrap();
        // Tolerate a UTC midnight rollover between the two clock reads.
        assert!(parsed == expected || parsed == expected.succ_opt().unwrap());
    }

    #[test]
    fn test_parse_invalid_date() {
        assert!(parse_date_or_interval("not-a-date").is_err());
        assert!(parse_date_or_interval("").is_err());
        assert!(parse_date_or_interval("-3d").is_err());
    }

    #[test]
    fn test_download_config_passthrough() {
        let cfg = Config::from_download_args(download_args(&[
            "--threads-num",
            "4",
            "--batch-size",
            "10",
            "--start-date",
            "2024-01-01",
            "--end-date",
            "2024-06-30",
            "--dry-run",
        ]))
        .unwrap();
        let dl = cfg.download_config().unwrap();
        assert_eq!(dl.base_path, PathBuf::from("/photos"));
        assert_eq!(dl.concurrency, 4);
        assert_eq!(dl.batch_size, 10);
        assert_eq!(dl.start_date, Some(day(2024, 1, 1)));
        assert_eq!(dl.end_date, Some(day(2024, 6, 30)));
        assert!(dl.dry_run);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = Config::from_download_args(download_args(&[
            "--start-date",
            "2024-06-01",
            "--end-date",
            "2024-01-01",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("after"));
    }

    #[test]
    fn test_retry_config_from_flags() {
        let cfg = Config::from_download_args(download_args(&[
            "--max-retries",
            "0",
            "--retry-delay",
            "1",
        ]))
        .unwrap();
        let retry = cfg.retry_config();
        assert_eq!(retry.max_retries, 0);
        assert_eq!(retry.base_delay_secs, 1);
        assert_eq!(retry.max_delay_secs, MAX_RETRY_DELAY_SECS);
    }

    #[test]
    fn test_request_timeout_from_flag() {
        let cfg = Config::from_download_args(download_args(&[])).unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(120));
        let cfg = Config::from_download_args(download_args(&["--timeout", "15"])).unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(15));
        let argv = ["gpsync", "download", "--credentials", "c.json", "-d", "/p", "--timeout", "0"];
        assert!(crate::cli::Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_index_has_no_download_config() {
        let cli = crate::cli::Cli::try_parse_from(["gpsync", "index", "--credentials", "c.json"])
            .unwrap();
        let crate::cli::Command::Index(args) = cli.command else {
            panic!("expected index");
        };
        let cfg = Config::from_index_args(args);
        assert!(cfg.download_config().is_err());
    }

    #[test]
    fn test_debug_redacts_credentials_path() {
        let cfg = Config::from_download_args(download_args(&[])).unwrap();
        assert!(!format!("{cfg:?}").contains("c.json"));
    }
}
