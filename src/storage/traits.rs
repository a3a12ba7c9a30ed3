//! Storage traits and error types
//!
//! This module defines the document store interface the crawl pipeline
//! writes through, and its associated error types.

use crate::crawler::CrawledPage;
use crate::state::PageStatus;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Raw page collections, each keyed uniquely by `url`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    RawPages,
    RawBids,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::RawPages => "raw_pages",
            Self::RawBids => "raw_bids",
        }
    }

    pub fn all() -> &'static [Collection] {
        &[Self::RawPages, Self::RawBids]
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// Result of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A document with the same url was already stored and was left untouched
    AlreadyExists,
}

/// Document store for crawled pages
///
/// The unique `url` key in every collection is the deduplication authority:
/// for concurrent inserts of the same url exactly one is `Inserted`, every
/// other caller sees `AlreadyExists`.
pub trait DocumentStore {
    /// Looks up a page by its url
    fn find_one(&self, collection: Collection, url: &str) -> StorageResult<Option<CrawledPage>>;

    /// Inserts the page unless a page with the same url exists
    ///
    /// An existing document is never overwritten.
    fn insert_one(&mut self, collection: Collection, page: &CrawledPage) -> StorageResult<InsertOutcome>;

    /// Moves a stored page to a new processing status
    ///
    /// Used by downstream consumers; returns `false` when no page has that url.
    fn update_status(
        &mut self,
        collection: Collection,
        url: &str,
        status: PageStatus,
    ) -> StorageResult<bool>;

    /// Counts the documents in a collection
    fn count(&self, collection: Collection) -> StorageResult<u64>;
}
