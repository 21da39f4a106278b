//! Command-line interface parsing for the bookings viewer
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into a validated [`StartupConfig`] for the composition root.

use clap::Parser;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::data::{InvalidTtl, SourceConfig};
use crate::refresh::RefreshConfig;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The payload file could not be read
    #[error("Cannot read payload file '{}': {source}", .path.display())]
    PayloadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload file is not valid JSON
    #[error("Payload file '{}' is not valid JSON: {source}", .path.display())]
    PayloadParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The requested time-to-live is zero or negative
    #[error("Invalid --ttl-minutes: {0}")]
    Ttl(#[from] InvalidTtl),

    /// The requested time-to-live does not fit in a duration
    #[error("Invalid --ttl-minutes: {0} is out of range")]
    TtlOutOfRange(i64),
}

/// Bookings - view booking travel segments
#[derive(Parser, Debug)]
#[command(name = "bookings")]
#[command(about = "View booking travel segments with a local, expiring cache")]
#[command(version)]
pub struct Cli {
    /// JSON payload served by the simulated booking API (defaults to the bundled sample)
    #[arg(long, value_name = "FILE", env = "BOOKINGS_PAYLOAD")]
    pub payload: Option<PathBuf>,

    /// Directory for the persistent cache (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR", env = "BOOKINGS_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Simulated network latency in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub latency_ms: u64,

    /// Minutes fetched data stays fresh
    #[arg(long, value_name = "MINUTES", default_value_t = 30)]
    pub ttl_minutes: i64,

    /// Seconds between background reloads; 0 disables auto-refresh
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub auto_refresh: u64,

    /// Keep the cache in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Force a fresh fetch at startup, ignoring the cache
    #[arg(long)]
    pub refresh: bool,

    /// Wipe the whole cache before starting
    #[arg(long)]
    pub clear_cache: bool,

    /// Print the segment list to stdout and exit instead of opening the TUI
    #[arg(long)]
    pub plain: bool,
}

/// Where the cache lives
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheLocation {
    /// XDG cache directory
    #[default]
    Default,
    /// Explicit directory
    Dir(PathBuf),
    /// Nothing persisted
    Memory,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    /// Payload to serve; `None` means the bundled sample
    pub payload: Option<Value>,
    /// Cache placement
    pub cache: CacheLocation,
    /// Latency and TTL of the simulated source
    pub source: SourceConfig,
    /// Background refresh settings
    pub refresh: RefreshConfig,
    /// Start with a forced refresh
    pub force_refresh: bool,
    /// Wipe the cache before starting
    pub clear_cache: bool,
    /// Plain stdout output instead of the TUI
    pub plain: bool,
}

/// Reads and parses a payload file
pub fn read_payload(path: &Path) -> Result<Value, CliError> {
    let content = fs::read_to_string(path).map_err(|source| CliError::PayloadRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::PayloadParse {
        path: path.to_path_buf(),
        source,
    })
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with appropriate settings
    /// * `Err(CliError)` if the payload file cannot be read or parsed, or the
    ///   time-to-live is not positive
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let payload = cli.payload.as_deref().map(read_payload).transpose()?;

        let cache = if cli.no_persist {
            CacheLocation::Memory
        } else if let Some(dir) = &cli.cache_dir {
            CacheLocation::Dir(dir.clone())
        } else {
            CacheLocation::Default
        };

        let ttl = chrono::Duration::try_minutes(cli.ttl_minutes)
            .ok_or(CliError::TtlOutOfRange(cli.ttl_minutes))?;
        let source = SourceConfig::new(Duration::from_millis(cli.latency_ms), ttl)?;

        let refresh = RefreshConfig {
            interval: Duration::from_secs(cli.auto_refresh.max(1)),
            enabled: cli.auto_refresh > 0,
        };

        Ok(StartupConfig {
            payload,
            cache,
            source,
            refresh,
            force_refresh: cli.refresh,
            clear_cache: cli.clear_cache,
            plain: cli.plain,
        })
    }
}
