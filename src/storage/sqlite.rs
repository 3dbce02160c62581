//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    is_valid_identifier, CollectionRecord, CollectionStatistics, CollectionStatus, DownloadTask,
    INSERT_BATCH_SIZE,
};
use crate::url::ImageUrlTemplate;
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
///
/// The connection sits behind a mutex, so one instance can be shared by
/// every pipeline worker and writes are applied one at a time.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        // Commits must survive a crash of the process or the machine
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Storage for SqliteStorage {
    // ===== Identifier Registry =====

    fn exists(&self, identifier: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM collections WHERE collection_id = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn all_known_identifiers(&self) -> StorageResult<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT collection_id FROM collections")?;
        let identifiers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(identifiers)
    }

    fn insert_new(&self, identifiers: &BTreeSet<String>) -> StorageResult<Vec<String>> {
        let valid: Vec<&String> = identifiers
            .iter()
            .filter(|identifier| {
                let ok = is_valid_identifier(identifier);
                if !ok {
                    tracing::debug!(identifier = %identifier, "Skipping malformed identifier");
                }
                ok
            })
            .collect();

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = Vec::new();

        for batch in valid.chunks(INSERT_BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO collections (collection_id, discovered_at) VALUES (?1, ?2)",
                )?;
                for identifier in batch {
                    if stmt.execute(params![identifier, now])? == 1 {
                        inserted.push((*identifier).clone());
                    }
                }
            }
            tx.commit()?;
        }

        if !inserted.is_empty() {
            tracing::debug!(count = inserted.len(), "Recorded new identifiers");
        }

        Ok(inserted)
    }

    // ===== Resume Queries =====

    fn pending_metadata(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT collection_id FROM collections WHERE info_status = 0
             ORDER BY CAST(collection_id AS INTEGER)",
        )?;
        let identifiers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(identifiers)
    }

    fn pending_downloads(&self) -> StorageResult<Vec<DownloadTask>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.collection_id, i.name, i.image_count, i.url_prefix, i.url_suffix, i.index_width
             FROM collections c
             JOIN collection_info i ON i.collection_id = c.collection_id
             WHERE c.info_status = 1 AND c.download_status = 0
             ORDER BY CAST(c.collection_id AS INTEGER)",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            let (identifier, name, image_count, prefix, suffix, index_width) = row?;

            let image_count =
                u32::try_from(image_count).map_err(|_| StorageError::InvalidRecord {
                    identifier: identifier.clone(),
                    message: format!("image count {} out of range", image_count),
                })?;
            let index_width =
                usize::try_from(index_width).map_err(|_| StorageError::InvalidRecord {
                    identifier: identifier.clone(),
                    message: format!("index width {} out of range", index_width),
                })?;

            let template = ImageUrlTemplate {
                prefix,
                suffix,
                index_width,
            };

            tasks.push(DownloadTask {
                identifier,
                name,
                image_urls: template.expand(image_count),
            });
        }

        Ok(tasks)
    }

    // ===== Status Updates =====

    fn save_metadata(&self, record: &CollectionRecord) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let (year, month, day) = match &record.date {
            Some(date) => (
                Some(date.year.as_str()),
                Some(date.month.as_str()),
                Some(date.day.as_str()),
            ),
            None => (None, None, None),
        };

        let tx = conn.transaction()?;

        // Metadata may arrive for an identifier that was never listed
        tx.execute(
            "INSERT OR IGNORE INTO collections (collection_id, discovered_at) VALUES (?1, ?2)",
            params![record.identifier, now],
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO collection_info
             (collection_id, name, image_count, year, month, day, url_prefix, url_suffix, index_width, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.identifier,
                record.name,
                record.image_count,
                year,
                month,
                day,
                record.template.prefix,
                record.template.suffix,
                record.template.index_width as i64,
                now,
            ],
        )?;

        {
            let mut insert_tag = tx.prepare_cached("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
            let mut select_tag = tx.prepare_cached("SELECT id FROM tags WHERE name = ?1")?;
            let mut link_tag = tx.prepare_cached(
                "INSERT OR IGNORE INTO collection_tags (collection_id, tag_id) VALUES (?1, ?2)",
            )?;

            for tag_name in &record.tag_names {
                insert_tag.execute(params![tag_name])?;
                let tag_id: i64 = select_tag.query_row(params![tag_name], |row| row.get(0))?;
                link_tag.execute(params![record.identifier, tag_id])?;
            }
        }

        tx.execute(
            "UPDATE collections SET info_status = 1 WHERE collection_id = ?1",
            params![record.identifier],
        )?;

        tx.commit()?;

        tracing::debug!(identifier = %record.identifier, "Collection metadata stored");
        Ok(())
    }

    fn mark_downloaded(&self, identifier: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE collections SET download_status = 1, downloaded_at = ?1 WHERE collection_id = ?2",
            params![now, identifier],
        )?;

        if updated == 0 {
            return Err(StorageError::Database(format!(
                "cannot mark unknown collection {} as downloaded",
                identifier
            )));
        }

        tracing::debug!(identifier = %identifier, "Collection marked downloaded");
        Ok(())
    }

    fn reset_download_flags(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let reset = conn.execute(
            "UPDATE collections SET download_status = 0, downloaded_at = NULL WHERE download_status = 1",
            [],
        )?;
        Ok(reset)
    }

    // ===== Statistics =====

    fn status(&self, identifier: &str) -> StorageResult<Option<CollectionStatus>> {
        let conn = self.lock()?;
        let status = conn
            .query_row(
                "SELECT info_status, download_status FROM collections WHERE collection_id = ?1",
                params![identifier],
                |row| {
                    Ok(CollectionStatus {
                        metadata_fetched: row.get::<_, i64>(0)? != 0,
                        downloaded: row.get::<_, i64>(1)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(status)
    }

    fn statistics(&self) -> StorageResult<CollectionStatistics> {
        let conn = self.lock()?;

        let (total, with_metadata, downloaded): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN info_status = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN download_status = 1 THEN 1 ELSE 0 END), 0)
             FROM collections",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let total_images: i64 = conn.query_row(
            "SELECT COALESCE(SUM(image_count), 0) FROM collection_info",
            [],
            |row| row.get(0),
        )?;

        Ok(CollectionStatistics {
            total: total as u64,
            with_metadata: with_metadata as u64,
            downloaded: downloaded as u64,
            total_images: total_images as u64,
        })
    }
}
