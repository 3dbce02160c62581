use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Gallery-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Builds a configuration for `base_url` with every other setting at its default
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            site: SiteConfig {
                base_url: base_url.to_string(),
                tag_index_path: default_tag_index_path(),
                terminal_tag: default_terminal_tag(),
            },
            fetch: FetchConfig::default(),
            workers: WorkerConfig::default(),
            download: DownloadConfig::default(),
            storage: StorageConfig::default(),
            bootstrap: BootstrapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Source site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base URL of the gallery site (e.g. "https://www.example.com")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the tag index page, relative to the base URL
    #[serde(rename = "tag-index-path", default = "default_tag_index_path")]
    pub tag_index_path: String,

    /// Last tag of the catalog; tag discovery stops after it. Empty disables.
    #[serde(rename = "terminal-tag", default = "default_terminal_tag")]
    pub terminal_tag: String,
}

/// Fetch client behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Attempts per request for status, timeout and transport failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Sleep after an HTTP 429 before retrying (seconds)
    #[serde(rename = "retry-cooldown-secs", default = "default_retry_cooldown_secs")]
    pub retry_cooldown_secs: u64,

    /// Maximum number of 429 cooldowns for a single request
    #[serde(rename = "rate-limit-retries", default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,

    /// Maximum number of simultaneous requests across all stages
    #[serde(rename = "connection-limit", default = "default_connection_limit")]
    pub connection_limit: usize,

    /// Total request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Lower bound of the random pre-request delay (milliseconds)
    #[serde(rename = "jitter-min-ms", default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    /// Upper bound of the random pre-request delay (milliseconds)
    #[serde(rename = "jitter-max-ms", default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Write buffer size used when streaming a body to disk (bytes)
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl FetchConfig {
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_cooldown_secs: default_retry_cooldown_secs(),
            rate_limit_retries: default_rate_limit_retries(),
            connection_limit: default_connection_limit(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Worker counts per pipeline stage
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number discovery workers (tag page -> identifiers)
    #[serde(default = "default_page_workers")]
    pub number: usize,

    /// Info discovery workers (identifier -> metadata)
    #[serde(default = "default_page_workers")]
    pub info: usize,

    /// Image downloaders
    #[serde(default = "default_download_workers")]
    pub download: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            number: default_page_workers(),
            info: default_page_workers(),
            download: default_download_workers(),
        }
    }
}

/// Downloader configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Root directory; one sub-directory per collection is created under it
    #[serde(default = "default_download_root")]
    pub root: PathBuf,

    /// Lower bound of the delay between two image fetches (milliseconds)
    #[serde(rename = "image-delay-min-ms", default = "default_image_delay_min_ms")]
    pub image_delay_min_ms: u64,

    /// Upper bound of the delay between two image fetches (milliseconds)
    #[serde(rename = "image-delay-max-ms", default = "default_image_delay_max_ms")]
    pub image_delay_max_ms: u64,

    /// Number of failed images at which a collection is abandoned
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root: default_download_root(),
            image_delay_min_ms: default_image_delay_min_ms(),
            image_delay_max_ms: default_image_delay_max_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Thresholds deciding whether tag discovery runs before the other stages
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Below this many known identifiers the store is considered small
    #[serde(
        rename = "known-identifier-threshold",
        default = "default_known_identifier_threshold"
    )]
    pub known_identifier_threshold: usize,

    /// Below this many pending downloads the backlog is considered small
    #[serde(
        rename = "pending-download-threshold",
        default = "default_pending_download_threshold"
    )]
    pub pending_download_threshold: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            known_identifier_threshold: default_known_identifier_threshold(),
            pending_download_threshold: default_pending_download_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Forces debug-level logging for the crate
    #[serde(default)]
    pub debug: bool,
}

fn default_tag_index_path() -> String {
    "zhuanti/".to_string()
}

fn default_terminal_tag() -> String {
    "cosplay".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_cooldown_secs() -> u64 {
    20
}

fn default_rate_limit_retries() -> u32 {
    5
}

fn default_connection_limit() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_jitter_min_ms() -> u64 {
    500
}

fn default_jitter_max_ms() -> u64 {
    1500
}

fn default_chunk_size() -> usize {
    1024
}

fn default_page_workers() -> usize {
    1
}

fn default_download_workers() -> usize {
    3
}

fn default_download_root() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_image_delay_min_ms() -> u64 {
    500
}

fn default_image_delay_max_ms() -> u64 {
    2500
}

fn default_failure_threshold() -> usize {
    10
}

fn default_database_path() -> String {
    "./harvest.db".to_string()
}

fn default_known_identifier_threshold() -> usize {
    1000
}

fn default_pending_download_threshold() -> usize {
    10
}
