//! Crawl orchestration: fetch, extract, dedup and persist across a batch
//!
//! One target's failure never aborts the batch. Every page ends as saved,
//! skipped or error, and the counts come back in a [`RunSummary`] rather
//! than as an error.

use crate::config::CrawlerConfig;
use crate::crawler::dedup::{DedupGate, DedupVerdict};
use crate::crawler::extractor::extract_page;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::summary::{PageOutcome, RunSummary, TargetOutcome};
use crate::sites::CrawlTarget;
use crate::storage::{InsertOutcome, SharedStore};

/// Composes the fetcher, extractor, dedup gate and store
///
/// Holds no per-run state: each [`run_batch`](Self::run_batch) call gets its
/// own dedup set, so concurrent runs share nothing in memory and rely on the
/// store's unique url for consistency.
#[derive(Clone)]
pub struct CrawlOrchestrator {
    fetcher: PageFetcher,
    store: SharedStore,
    max_pages_per_target: usize,
    skip_known_urls: bool,
}

/// Mutable state of one run
struct RunState {
    dedup: DedupGate,
    transient_errors: bool,
}

impl CrawlOrchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Shared fetcher; clones share one connection pool
    /// * `store` - Document store pages are persisted into
    /// * `config` - Supplies the per-target page cap and the store pre-check flag
    pub fn new(fetcher: PageFetcher, store: SharedStore, config: &CrawlerConfig) -> Self {
        Self {
            fetcher,
            store,
            max_pages_per_target: config.max_pages_per_target,
            skip_known_urls: config.skip_known_urls,
        }
    }

    /// The store this orchestrator persists into
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Runs every target in order and aggregates the outcomes
    pub async fn run_batch(&self, targets: &[CrawlTarget]) -> RunSummary {
        tracing::info!("Starting crawl batch for {} sites", targets.len());

        let mut state = RunState {
            dedup: if self.skip_known_urls {
                DedupGate::with_store(self.store.clone())
            } else {
                DedupGate::new()
            },
            transient_errors: false,
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self.run_target(target, &mut state).await;
            tracing::info!(
                "Crawl site {} completed: {} saved, {} skipped, {} errors",
                target.name,
                outcome.saved,
                outcome.skipped,
                outcome.errors
            );
            outcomes.push(outcome);
        }

        let summary = RunSummary::from_outcomes(outcomes, state.transient_errors);
        tracing::info!("{}", summary.message);
        summary
    }

    async fn run_target(&self, target: &CrawlTarget, state: &mut RunState) -> TargetOutcome {
        let mut outcome = TargetOutcome::new(&target.id);

        if target.start_urls.is_empty() {
            tracing::warn!("Target {} has no start URLs", target.id);
            outcome.record(PageOutcome::Error);
            return outcome;
        }

        for url in &target.start_urls {
            if outcome.saved >= self.max_pages_per_target {
                tracing::debug!(
                    "Target {} reached its cap of {} pages",
                    target.id,
                    self.max_pages_per_target
                );
                break;
            }

            let page_outcome = self.process_url(target, url, state).await;
            outcome.record(page_outcome);
        }

        outcome
    }

    /// Fetch, extract and persist one URL
    async fn process_url(&self, target: &CrawlTarget, url: &str, state: &mut RunState) -> PageOutcome {
        let collection = target.category.collection();

        match state.dedup.check(collection, url) {
            DedupVerdict::Fresh => {}
            DedupVerdict::SeenThisRun => {
                tracing::info!("URL already visited: {}", url);
                return PageOutcome::Skipped;
            }
            DedupVerdict::StoredEarlier => {
                tracing::info!("URL already stored: {}", url);
                return PageOutcome::Skipped;
            }
        }
        state.dedup.mark(url);

        let fetched = match self.fetcher.fetch(target, url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                if e.is_transient() {
                    state.transient_errors = true;
                    tracing::error!("{}", e);
                } else {
                    tracing::warn!("{}", e);
                }
                return PageOutcome::Error;
            }
        };

        let page = extract_page(&fetched.body, url, target, fetched.fetched_at);

        let inserted = {
            let mut store = self.store.lock().unwrap();
            store.insert_one(collection, &page)
        };

        match inserted {
            Ok(InsertOutcome::Inserted) => {
                tracing::info!("Successfully crawled: {}", page.title);
                PageOutcome::Saved
            }
            Ok(InsertOutcome::AlreadyExists) => {
                tracing::debug!("Page already exists in {}: {}", collection, url);
                PageOutcome::Skipped
            }
            Err(e) => {
                tracing::error!("Error saving {}: {}", url, e);
                PageOutcome::Error
            }
        }
    }
}
