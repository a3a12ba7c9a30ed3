//! Crawler service: the compiled target catalog plus an orchestrator
//!
//! This is what job handlers call into. It owns target selection (explicit
//! ids or a bounded random sample) and turns a panicking run into a failed
//! summary instead of taking the worker down.

use crate::config::Config;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::orchestrator::CrawlOrchestrator;
use crate::crawler::summary::RunSummary;
use crate::sites::{compile_targets, CrawlTarget};
use crate::storage::SharedStore;
use crate::PulseError;
use std::sync::Arc;

/// Compiled targets and the orchestrator that crawls them
#[derive(Clone)]
pub struct CrawlerService {
    targets: Arc<Vec<CrawlTarget>>,
    orchestrator: CrawlOrchestrator,
    sample_size: usize,
}

impl CrawlerService {
    pub fn new(targets: Vec<CrawlTarget>, orchestrator: CrawlOrchestrator, sample_size: usize) -> Self {
        Self {
            targets: Arc::new(targets),
            orchestrator,
            sample_size,
        }
    }

    /// Compiles the site catalog and builds the fetcher from config
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlerService)` - Ready to run batches
    /// * `Err(PulseError)` - Malformed site tree or HTTP client failure
    pub fn from_config(config: &Config, store: SharedStore) -> Result<Self, PulseError> {
        let targets = compile_targets(&config.sites, &config.crawler)?;
        let fetcher = PageFetcher::from_config(&config.user_agent, &config.crawler)?;
        let orchestrator = CrawlOrchestrator::new(fetcher, store, &config.crawler);
        Ok(Self::new(targets, orchestrator, config.crawler.sample_size))
    }

    /// All compiled targets, in compiled order
    pub fn targets(&self) -> &[CrawlTarget] {
        &self.targets
    }

    pub fn orchestrator(&self) -> &CrawlOrchestrator {
        &self.orchestrator
    }

    /// Targets whose id is in `ids`, in compiled order
    pub fn targets_by_ids(&self, ids: &[String]) -> Vec<CrawlTarget> {
        self.targets
            .iter()
            .filter(|target| ids.contains(&target.id))
            .cloned()
            .collect()
    }

    /// A random sample of at most `sample_size` targets
    pub fn sample_targets(&self) -> Vec<CrawlTarget> {
        let amount = self.sample_size.min(self.targets.len());
        fastrand::choose_multiple(self.targets.iter().cloned(), amount)
    }

    /// Runs one crawl batch over the named targets, or over a random sample
    ///
    /// The batch runs on its own task; a panic inside it is reported as a
    /// failed summary.
    pub async fn run_crawl_task(&self, site_ids: Option<&[String]>) -> RunSummary {
        let targets = match site_ids {
            Some(ids) => self.targets_by_ids(ids),
            None => self.sample_targets(),
        };

        tracing::info!("Starting crawl task for {} sites", targets.len());

        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move { orchestrator.run_batch(&targets).await });

        match handle.await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Crawl task aborted: {}", e);
                RunSummary::failed(e.to_string())
            }
        }
    }
}
