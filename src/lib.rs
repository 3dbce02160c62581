//! Gallery-Harvest: an incremental gallery crawler
//!
//! This crate discovers topic tags on a paginated gallery site, enumerates the
//! tag listing pages, records every collection identifier it finds, fetches the
//! metadata of each collection and downloads its image sequence. Progress is
//! persisted in SQLite so a re-run only touches new or unfinished work.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Gallery-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collection {identifier} abandoned after {failures} failed images")]
    ExcessiveFailure { identifier: String, failures: usize },

    #[error("Worker task panicked: {0}")]
    WorkerPanic(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised by the fetch client
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("Still rate limited after {cooldowns} cooldowns: {url}")]
    RateLimited { url: String, cooldowns: u32 },

    #[error("Request cancelled: {url}")]
    Cancelled { url: String },

    #[error("Failed writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    /// Returns true if the request was abandoned because of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if another attempt at the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::Timeout { .. } | Self::Request { .. }
        )
    }
}

/// Errors raised when a page does not have the expected structure
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Missing node '{selector}' in {context}")]
    MissingNode {
        selector: &'static str,
        context: String,
    },

    #[error("Invalid number '{value}' in {context}")]
    InvalidNumber { value: String, context: String },

    #[error("Malformed image URL '{0}'")]
    MalformedImageUrl(String),
}

/// Result type alias for Gallery-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, RunOutcome, RunSummary};
pub use state::StageState;
pub use storage::{CollectionRecord, DownloadTask, SqliteStorage, Storage};
