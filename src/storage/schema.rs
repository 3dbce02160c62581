//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Gallery-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Every collection identifier ever discovered, with its processing flags
CREATE TABLE IF NOT EXISTS collections (
    collection_id TEXT PRIMARY KEY,
    info_status INTEGER NOT NULL DEFAULT 0,
    download_status INTEGER NOT NULL DEFAULT 0,
    discovered_at TEXT NOT NULL,
    downloaded_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_collections_status ON collections(info_status, download_status);

-- Metadata of collections whose landing page has been parsed
CREATE TABLE IF NOT EXISTS collection_info (
    collection_id TEXT PRIMARY KEY REFERENCES collections(collection_id),
    name TEXT NOT NULL,
    image_count INTEGER NOT NULL,
    year TEXT,
    month TEXT,
    day TEXT,
    url_prefix TEXT NOT NULL,
    url_suffix TEXT NOT NULL,
    index_width INTEGER NOT NULL DEFAULT 2,
    fetched_at TEXT NOT NULL
);

-- Tag names attached to collections
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS collection_tags (
    collection_id TEXT NOT NULL REFERENCES collections(collection_id),
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (collection_id, tag_id)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
