//! Two-layer URL deduplication
//!
//! The in-memory set covers the current run only and avoids redundant
//! fetches within one pass. Across runs and workers the store's unique `url`
//! key is the authority; the optional store lookup here only saves a fetch.

use crate::storage::{Collection, SharedStore};
use std::collections::HashSet;

/// Why a URL was, or was not, let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    Fresh,
    SeenThisRun,
    StoredEarlier,
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Per-run deduplication gate
pub struct DedupGate {
    seen: HashSet<String>,
    store: Option<SharedStore>,
}

impl DedupGate {
    /// A gate that only tracks the current run
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            store: None,
        }
    }

    /// A gate that also consults the store for pages saved by earlier runs
    pub fn with_store(store: SharedStore) -> Self {
        Self {
            seen: HashSet::new(),
            store: Some(store),
        }
    }

    /// Whether the URL was already handled in this run
    pub fn seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Records the URL for this run; returns `false` if it was already marked
    pub fn mark(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }

    /// Checks both layers
    ///
    /// A failing store lookup is logged and treated as fresh; the insert at
    /// persist time still rejects a duplicate.
    pub fn check(&self, collection: Collection, url: &str) -> DedupVerdict {
        if self.seen(url) {
            return DedupVerdict::SeenThisRun;
        }

        let Some(store) = &self.store else {
            return DedupVerdict::Fresh;
        };

        let found = {
            let store = store.lock().unwrap();
            store.find_one(collection, url)
        };

        match found {
            Ok(Some(_)) => DedupVerdict::StoredEarlier,
            Ok(None) => DedupVerdict::Fresh,
            Err(e) => {
                tracing::warn!("Store lookup failed for {}: {}", url, e);
                DedupVerdict::Fresh
            }
        }
    }

    /// Number of URLs marked in this run
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new()
    }
}
