//! Storage traits and error types
//!
//! This module defines the trait interface for the dedup store and
//! associated error types.

use crate::storage::{CollectionRecord, CollectionStatistics, CollectionStatus, DownloadTask};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Every storage error is fatal to a crawl run: once a write is lost the
/// store can no longer tell which collections were already handled.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Invalid stored record for {identifier}: {message}")]
    InvalidRecord { identifier: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for dedup store implementations
///
/// All operations take `&self`: implementations serialize access to the
/// underlying database themselves, so pipeline stages share one store
/// through an `Arc` without any lock of their own. Every write is committed
/// before the call returns.
pub trait Storage: Send + Sync {
    // ===== Identifier Registry =====

    /// Returns true if the identifier is already recorded
    fn exists(&self, identifier: &str) -> StorageResult<bool>;

    /// Returns every recorded identifier
    fn all_known_identifiers(&self) -> StorageResult<HashSet<String>>;

    /// Records new identifiers
    ///
    /// Identifiers that are already present or are not purely numeric are
    /// skipped. Inserts are committed in batches.
    ///
    /// # Returns
    ///
    /// The identifiers that were actually inserted by this call; its length
    /// is the inserted count.
    fn insert_new(&self, identifiers: &BTreeSet<String>) -> StorageResult<Vec<String>>;

    // ===== Resume Queries =====

    /// Identifiers whose metadata has not been fetched yet
    fn pending_metadata(&self) -> StorageResult<Vec<String>>;

    /// Collections with metadata whose images are not all downloaded
    ///
    /// The image URL list is rebuilt from the stored template and count.
    fn pending_downloads(&self) -> StorageResult<Vec<DownloadTask>>;

    // ===== Status Updates =====

    /// Stores collection metadata and sets the metadata-fetched flag
    fn save_metadata(&self, record: &CollectionRecord) -> StorageResult<()>;

    /// Sets the download-complete flag of a collection
    fn mark_downloaded(&self, identifier: &str) -> StorageResult<()>;

    /// Clears every download-complete flag
    ///
    /// # Returns
    ///
    /// The number of collections that were reset
    fn reset_download_flags(&self) -> StorageResult<usize>;

    // ===== Statistics =====

    /// Processing flags of a single collection, None if unknown
    fn status(&self, identifier: &str) -> StorageResult<Option<CollectionStatus>>;

    /// Aggregate counts for reporting
    fn statistics(&self) -> StorageResult<CollectionStatistics>;
}
