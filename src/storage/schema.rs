//! Database schema definitions
//!
//! This module contains the SQL schema for the raw page collections.

/// SQL schema for the database
///
/// `raw_pages` holds policy documents and `raw_bids` holds procurement
/// notices. Both share one layout and a unique `url`.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS raw_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    source TEXT NOT NULL,
    region TEXT NOT NULL,
    industry TEXT,
    publish_date TEXT NOT NULL,
    crawl_date TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_raw_pages_status ON raw_pages(status);
CREATE INDEX IF NOT EXISTS idx_raw_pages_crawl_date ON raw_pages(crawl_date);
CREATE INDEX IF NOT EXISTS idx_raw_pages_region ON raw_pages(region);

CREATE TABLE IF NOT EXISTS raw_bids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    source TEXT NOT NULL,
    region TEXT NOT NULL,
    industry TEXT,
    publish_date TEXT NOT NULL,
    crawl_date TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_raw_bids_status ON raw_bids(status);
CREATE INDEX IF NOT EXISTS idx_raw_bids_crawl_date ON raw_bids(crawl_date);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
