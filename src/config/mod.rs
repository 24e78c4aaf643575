//! Configuration module for the directory core.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Schema version of the cached configuration blobs expected by this build.
///
/// Bumping this invalidates every cached entry on the next refresh.
pub const CONFIG_SCHEMA_VERSION: i64 = 4;

/// Page size used when walking the remote directory collection.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Maximum number of ranked search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Freshness window for cached configuration blobs.
pub const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(60 * 60);

/// Core configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Rows requested per remote page during a full resync
    pub page_size: usize,
    /// Age after which a cached configuration blob is refreshed
    pub config_ttl: Duration,
    /// Cap on ranked search results
    pub search_limit: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/directory.sqlite"),
            page_size: DEFAULT_PAGE_SIZE,
            config_ttl: DEFAULT_CONFIG_TTL,
            search_limit: DEFAULT_SEARCH_LIMIT,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let db_path = env::var("DIRECTORY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let page_size = parse_var("DIRECTORY_SYNC_PAGE_SIZE", defaults.page_size).max(1);

        let config_ttl = Duration::from_secs(parse_var(
            "DIRECTORY_CONFIG_TTL_SECS",
            defaults.config_ttl.as_secs(),
        ));

        let search_limit = parse_var("DIRECTORY_SEARCH_LIMIT", defaults.search_limit);

        let log_level = env::var("DIRECTORY_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_json = env::var("DIRECTORY_LOG_FORMAT")
            .map(|f| f.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(defaults.log_json);

        Self {
            db_path,
            page_size,
            config_ttl,
            search_limit,
            log_level,
            log_json,
        }
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value {:?}, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
