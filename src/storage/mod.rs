//! Storage module for persisting crawled pages
//!
//! This module handles all database operations for the crawl pipeline:
//! - SQLite database initialization and schema management
//! - Insert-if-absent persistence keyed by url
//! - Status transitions made by downstream consumers

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Collection, DocumentStore, InsertOutcome, StorageError, StorageResult};

use crate::PulseError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A store shared between the orchestrator and job handlers
///
/// Every call is a short critical section; the lock is never held across an
/// `.await`.
pub type SharedStore = Arc<Mutex<dyn DocumentStore + Send>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(PulseError)` - Failed to initialize storage
pub fn open_store(path: &Path) -> Result<SqliteStore, PulseError> {
    SqliteStore::new(path)
}

/// Opens the store at `path` wrapped for sharing across tasks
pub fn open_shared_store(path: &Path) -> Result<SharedStore, PulseError> {
    let store = SqliteStore::new(path)?;
    Ok(Arc::new(Mutex::new(store)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_table_names() {
        assert_eq!(Collection::RawPages.table_name(), "raw_pages");
        assert_eq!(Collection::RawBids.table_name(), "raw_bids");
        assert_eq!(Collection::all().len(), 2);
    }

    #[test]
    fn test_open_shared_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = open_shared_store(&dir.path().join("pulse.db")).unwrap();
        let count = store.lock().unwrap().count(Collection::RawPages).unwrap();
        assert_eq!(count, 0);
    }
}
