//! Job submission surface
//!
//! Everything here is fire-and-forget except the status lookups.

use crate::tasks::broker::{enqueue, Broker};
use crate::tasks::job::{Job, JobKind, JobStatusView};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Ids of a fanned-out batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupHandle {
    pub group_id: Uuid,
    pub job_ids: Vec<Uuid>,
}

#[derive(Clone)]
pub struct JobClient {
    broker: Arc<dyn Broker>,
}

impl JobClient {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Enqueues a job of any kind, routed to its queue
    pub fn submit(&self, kind: JobKind, payload: Value) -> Uuid {
        let now = Utc::now();
        let job_id = enqueue(self.broker.as_ref(), Job::new(kind, payload, now), now);
        info!(job_id = %job_id, kind = %kind, "job submitted");
        job_id
    }

    pub fn submit_crawl_site(&self, site_id: &str) -> Uuid {
        self.submit(JobKind::CrawlSite, json!({ "site_id": site_id }))
    }

    /// Crawls a random sample of targets
    pub fn submit_scheduled_crawl(&self) -> Uuid {
        self.submit(JobKind::ScheduledCrawl, json!({}))
    }

    /// Fans out one `crawl_site` job per id under a shared group id
    ///
    /// The group is not atomic: members succeed or fail independently.
    pub fn submit_many(&self, site_ids: &[String]) -> GroupHandle {
        let now = Utc::now();
        let group_id = Uuid::new_v4();

        let job_ids = site_ids
            .iter()
            .map(|site_id| {
                let job = Job::new(JobKind::CrawlSite, json!({ "site_id": site_id }), now)
                    .with_group(group_id);
                enqueue(self.broker.as_ref(), job, now)
            })
            .collect::<Vec<_>>();

        info!(group_id = %group_id, jobs = job_ids.len(), "batch submitted");
        GroupHandle { group_id, job_ids }
    }

    /// Current state of a job; `None` if unknown or past result retention
    pub fn status(&self, job_id: Uuid) -> Option<JobStatusView> {
        self.broker
            .get_record(job_id, Utc::now())
            .map(JobStatusView::from)
    }

    /// Per-member state of a batch, in submission order
    pub fn group_status(&self, group_id: Uuid) -> Vec<JobStatusView> {
        self.broker
            .group_members(group_id)
            .into_iter()
            .filter_map(|job_id| self.status(job_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::JobStatus;
    use crate::tasks::broker::MemoryBroker;
    use crate::tasks::job::QueueName;

    #[test]
    fn test_submit_routes_and_records() {
        let broker = Arc::new(MemoryBroker::default());
        let client = JobClient::new(broker.clone());

        let job_id = client.submit_crawl_site("gov_1");
        assert_eq!(broker.pending_count(QueueName::Crawl), 1);

        let view = client.status(job_id).unwrap();
        assert_eq!(view.kind, JobKind::CrawlSite);
        assert_eq!(view.status, JobStatus::Queued);
        assert!(!view.ready);
        assert!(view.result.is_none());
    }

    #[test]
    fn test_submit_many_groups_jobs() {
        let broker = Arc::new(MemoryBroker::default());
        let client = JobClient::new(broker.clone());

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let handle = client.submit_many(&ids);

        assert_eq!(handle.job_ids.len(), 3);
        assert_eq!(broker.pending_count(QueueName::Crawl), 3);

        let statuses = client.group_status(handle.group_id);
        assert_eq!(statuses.len(), 3);
        assert_eq!(
            statuses.iter().map(|s| s.job_id).collect::<Vec<_>>(),
            handle.job_ids
        );
    }

    #[test]
    fn test_unknown_job_has_no_status() {
        let client = JobClient::new(Arc::new(MemoryBroker::default()));
        assert!(client.status(Uuid::new_v4()).is_none());
        assert!(client.group_status(Uuid::new_v4()).is_empty());
    }
}
