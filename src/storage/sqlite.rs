//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DocumentStore
//! trait. Insert-if-absent is a single `INSERT ... ON CONFLICT(url) DO
//! NOTHING`, so the unique index decides races between concurrent runs.

use crate::crawler::CrawledPage;
use crate::state::PageStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Collection, DocumentStore, InsertOutcome, StorageError, StorageResult};
use crate::PulseError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits on another connection's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

/// A page row before timestamps and metadata are decoded
struct StoredRow {
    url: String,
    title: String,
    content: String,
    source: String,
    region: String,
    industry: Option<String>,
    publish_date: String,
    crawl_date: String,
    metadata: String,
    status: String,
    retry_count: u32,
}

impl SqliteStore {
    /// Opens (or creates) the store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(PulseError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, PulseError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, PulseError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Lists the stored pages of a collection with the given status, oldest first
    pub fn pages_with_status(
        &self,
        collection: Collection,
        status: PageStatus,
    ) -> StorageResult<Vec<CrawledPage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT url, title, content, source, region, industry, publish_date, crawl_date,
             metadata, status, retry_count
             FROM {} WHERE status = ?1 ORDER BY id",
            collection.table_name()
        ))?;

        let rows = stmt
            .query_map(params![status.to_db_string()], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_row).collect()
    }
}

impl DocumentStore for SqliteStore {
    fn find_one(&self, collection: Collection, url: &str) -> StorageResult<Option<CrawledPage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT url, title, content, source, region, industry, publish_date, crawl_date,
             metadata, status, retry_count
             FROM {} WHERE url = ?1",
            collection.table_name()
        ))?;

        let row = stmt.query_row(params![url], read_row).optional()?;
        row.map(decode_row).transpose()
    }

    fn insert_one(&mut self, collection: Collection, page: &CrawledPage) -> StorageResult<InsertOutcome> {
        let metadata = serde_json::to_string(&page.metadata)?;

        let changed = self.conn.execute(
            &format!(
                "INSERT INTO {} (url, title, content, source, region, industry, publish_date,
                 crawl_date, metadata, status, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(url) DO NOTHING",
                collection.table_name()
            ),
            params![
                page.url,
                page.title,
                page.content,
                page.source,
                page.region,
                page.industry,
                page.publish_date.to_rfc3339(),
                page.crawl_date.to_rfc3339(),
                metadata,
                page.status.to_db_string(),
                page.retry_count,
            ],
        )?;

        if changed == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    fn update_status(
        &mut self,
        collection: Collection,
        url: &str,
        status: PageStatus,
    ) -> StorageResult<bool> {
        let changed = self.conn.execute(
            &format!("UPDATE {} SET status = ?1 WHERE url = ?2", collection.table_name()),
            params![status.to_db_string(), url],
        )?;
        Ok(changed > 0)
    }

    fn count(&self, collection: Collection) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        url: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        source: row.get(3)?,
        region: row.get(4)?,
        industry: row.get(5)?,
        publish_date: row.get(6)?,
        crawl_date: row.get(7)?,
        metadata: row.get(8)?,
        status: row.get(9)?,
        retry_count: row.get(10)?,
    })
}

fn decode_row(row: StoredRow) -> StorageResult<CrawledPage> {
    Ok(CrawledPage {
        publish_date: parse_timestamp(&row.publish_date)?,
        crawl_date: parse_timestamp(&row.crawl_date)?,
        metadata: serde_json::from_str(&row.metadata)?,
        status: PageStatus::from_db_string(&row.status).ok_or_else(|| {
            StorageError::Serialization(format!("unknown page status '{}'", row.status))
        })?,
        url: row.url,
        title: row.title,
        content: row.content,
        source: row.source,
        region: row.region,
        industry: row.industry,
        retry_count: row.retry_count,
    })
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}
