//! Handlers for the crawl job kinds
//!
//! Downstream kinds (clean, analyze, notification) are left for the
//! embedding application to register.

use crate::crawler::{CrawlerService, RunSummary};
use crate::storage::{Collection, SharedStore};
use crate::tasks::broker::Broker;
use crate::tasks::client::JobClient;
use crate::tasks::job::{Job, JobKind, JobOutcome};
use crate::tasks::registry::{HandlerRegistry, JobHandler};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CrawlSitePayload {
    site_id: String,
}

#[derive(Debug, Deserialize)]
struct BatchCrawlPayload {
    site_ids: Vec<String>,
}

/// Maps a run summary onto a job outcome
///
/// A run is retried when it failed as a whole, or when it saved nothing and
/// at least one fetch failed transiently.
pub fn summary_outcome(summary: RunSummary) -> JobOutcome {
    if !summary.success {
        let error = summary
            .error
            .clone()
            .unwrap_or_else(|| summary.message.clone());
        return JobOutcome::Retryable(error);
    }

    if summary.transient_errors && summary.saved == 0 {
        return JobOutcome::Retryable(format!(
            "no pages saved and {} fetches failed, some transiently",
            summary.errors
        ));
    }

    match serde_json::to_value(&summary) {
        Ok(value) => JobOutcome::Success(value),
        Err(e) => JobOutcome::Fatal(format!("failed to serialize run summary: {}", e)),
    }
}

/// `crawl_site`: crawls one target by id
pub struct CrawlSiteHandler {
    service: CrawlerService,
}

impl CrawlSiteHandler {
    pub fn new(service: CrawlerService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for CrawlSiteHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let payload: CrawlSitePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Fatal(format!("invalid crawl_site payload: {}", e)),
        };

        let ids = [payload.site_id];
        if self.service.targets_by_ids(&ids).is_empty() {
            return JobOutcome::Fatal(format!("unknown site: {}", ids[0]));
        }

        info!(job_id = %job.id, site_id = %ids[0], "crawling site");
        summary_outcome(self.service.run_crawl_task(Some(&ids)).await)
    }
}

/// `scheduled_crawl`: crawls a random sample of targets
pub struct ScheduledCrawlHandler {
    service: CrawlerService,
}

impl ScheduledCrawlHandler {
    pub fn new(service: CrawlerService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for ScheduledCrawlHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        info!(job_id = %job.id, "running scheduled crawl");
        summary_outcome(self.service.run_crawl_task(None).await)
    }
}

/// `batch_crawl`: fans a list of site ids out into `crawl_site` jobs
pub struct BatchCrawlHandler {
    client: JobClient,
}

impl BatchCrawlHandler {
    pub fn new(client: JobClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for BatchCrawlHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let payload: BatchCrawlPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Fatal(format!("invalid batch_crawl payload: {}", e)),
        };

        let handle = self.client.submit_many(&payload.site_ids);
        JobOutcome::Success(json!({
            "success": true,
            "message": format!("Batch crawl job created: {}", handle.group_id),
            "job_id": handle.group_id,
            "site_count": payload.site_ids.len(),
        }))
    }
}

/// `system_maintenance`: redelivers stale jobs, purges expired job results
/// and reports store sizes
pub struct MaintenanceHandler {
    broker: Arc<dyn Broker>,
    store: SharedStore,
}

impl MaintenanceHandler {
    pub fn new(broker: Arc<dyn Broker>, store: SharedStore) -> Self {
        Self { broker, store }
    }
}

#[async_trait]
impl JobHandler for MaintenanceHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let now = Utc::now();
        let requeued = self.broker.requeue_stale(now);
        let purged = self.broker.purge_expired(now);

        let mut counts = Map::new();
        {
            let store = self.store.lock().unwrap();
            for collection in Collection::all() {
                match store.count(*collection) {
                    Ok(count) => {
                        counts.insert(collection.to_string(), Value::from(count));
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, "failed to count {}: {}", collection, e);
                        return JobOutcome::Retryable(e.to_string());
                    }
                }
            }
        }

        info!(job_id = %job.id, requeued, purged, "maintenance finished");
        JobOutcome::Success(json!({
            "success": true,
            "requeued": requeued,
            "purged_results": purged,
            "documents": counts,
        }))
    }
}

/// Registers the crawl handlers and the maintenance handler
pub fn register_crawl_handlers(
    registry: &mut HandlerRegistry,
    service: CrawlerService,
    client: JobClient,
    broker: Arc<dyn Broker>,
) {
    let store = service.orchestrator().store().clone();
    registry.register(JobKind::CrawlSite, CrawlSiteHandler::new(service.clone()));
    registry.register(JobKind::ScheduledCrawl, ScheduledCrawlHandler::new(service));
    registry.register(JobKind::BatchCrawl, BatchCrawlHandler::new(client));
    registry.register(JobKind::SystemMaintenance, MaintenanceHandler::new(broker, store));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{PageOutcome, TargetOutcome};
    use crate::tasks::broker::MemoryBroker;
    use crate::tasks::job::QueueName;

    fn summary(saved: usize, errors: usize, transient: bool) -> RunSummary {
        let mut outcome = TargetOutcome::new("gov_0");
        for _ in 0..saved {
            outcome.record(PageOutcome::Saved);
        }
        for _ in 0..errors {
            outcome.record(PageOutcome::Error);
        }
        RunSummary::from_outcomes(vec![outcome], transient)
    }

    #[test]
    fn test_summary_outcome() {
        assert!(matches!(summary_outcome(summary(2, 0, false)), JobOutcome::Success(_)));
        // Partial success with transient failures is still a success
        assert!(matches!(summary_outcome(summary(1, 1, true)), JobOutcome::Success(_)));
        assert!(matches!(summary_outcome(summary(0, 1, true)), JobOutcome::Retryable(_)));
        // Permanent failures only are not worth retrying
        assert!(matches!(summary_outcome(summary(0, 1, false)), JobOutcome::Success(_)));
        assert!(matches!(
            summary_outcome(RunSummary::failed("panicked")),
            JobOutcome::Retryable(e) if e == "panicked"
        ));
    }

    #[test]
    fn test_success_carries_summary_fields() {
        let JobOutcome::Success(value) = summary_outcome(summary(3, 0, false)) else {
            panic!("expected success");
        };
        assert_eq!(value["success"], true);
        assert_eq!(value["saved"], 3);
        assert_eq!(value["total_sites"], 1);
    }

    #[tokio::test]
    async fn test_batch_crawl_fans_out() {
        let broker = Arc::new(MemoryBroker::default());
        let handler = BatchCrawlHandler::new(JobClient::new(broker.clone()));
        let job = Job::new(
            JobKind::BatchCrawl,
            json!({"site_ids": ["a", "b"]}),
            Utc::now(),
        );

        let JobOutcome::Success(value) = handler.handle(&job).await else {
            panic!("expected success");
        };
        assert_eq!(value["site_count"], 2);
        assert!(value["message"]
            .as_str()
            .unwrap()
            .starts_with("Batch crawl job created: "));
        assert_eq!(broker.pending_count(QueueName::Crawl), 2);
    }

    #[tokio::test]
    async fn test_batch_crawl_rejects_bad_payload() {
        let handler = BatchCrawlHandler::new(JobClient::new(Arc::new(MemoryBroker::default())));
        let job = Job::new(JobKind::BatchCrawl, json!({"sites": 3}), Utc::now());
        assert!(matches!(handler.handle(&job).await, JobOutcome::Fatal(_)));
    }
}
