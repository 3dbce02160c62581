//! Storage module for persisting crawl progress
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The registry of known collection identifiers
//! - Metadata-fetched and download-complete flags
//! - Resume queries that rebuild the pending work of an earlier run

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::url::{ImageUrlTemplate, PublishDate};
use crate::HarvestError;

use std::path::Path;

/// Batch size for identifier inserts (one commit per batch)
pub const INSERT_BATCH_SIZE: usize = 100;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Returns true if the identifier has the shape the site uses (digits only)
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Metadata of one collection, as extracted from its landing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub identifier: String,
    pub name: String,
    pub image_count: u32,
    pub template: ImageUrlTemplate,
    pub date: Option<PublishDate>,
    pub tag_names: Vec<String>,
}

impl CollectionRecord {
    /// Full ordered list of image URLs of this collection
    pub fn image_urls(&self) -> Vec<String> {
        self.template.expand(self.image_count)
    }

    /// Builds the downloader's work item for this collection
    pub fn download_task(&self) -> DownloadTask {
        DownloadTask {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            image_urls: self.image_urls(),
        }
    }
}

/// A collection whose images should be downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub identifier: String,
    pub name: String,
    pub image_urls: Vec<String>,
}

/// Processing flags of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStatus {
    pub metadata_fetched: bool,
    pub downloaded: bool,
}

/// Aggregate store counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStatistics {
    /// Every identifier ever discovered
    pub total: u64,

    /// Identifiers with metadata fetched
    pub with_metadata: u64,

    /// Collections fully downloaded
    pub downloaded: u64,

    /// Sum of image counts over collections with metadata
    pub total_images: u64,
}
