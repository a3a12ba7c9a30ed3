//! Job layer tests: crawl jobs routed through the broker and worker

use crate::{mount_html, open_store, orchestrator, policy_html, target};
use chrono::{Duration, Utc};
use policy_pulse::crawler::CrawlerService;
use policy_pulse::sites::CrawlTarget;
use policy_pulse::tasks::{
    default_schedule, register_crawl_handlers, Broker, HandlerRegistry, JobClient, JobKind,
    MemoryBroker, PeriodicScheduler, QueueName, TaskRunner, TaskRunnerConfig,
};
use policy_pulse::JobStatus;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::MockServer;

struct Harness {
    broker: Arc<MemoryBroker>,
    client: JobClient,
    runner: TaskRunner,
    _dir: TempDir,
}

fn harness(targets: Vec<CrawlTarget>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("pulse.db"));
    let service = CrawlerService::new(targets, orchestrator(store), 5);

    let broker = Arc::new(MemoryBroker::default());
    let client = JobClient::new(broker.clone());

    let mut registry = HandlerRegistry::new();
    register_crawl_handlers(&mut registry, service, client.clone(), broker.clone());
    let runner = TaskRunner::new(broker.clone(), registry, TaskRunnerConfig::default());

    Harness {
        broker,
        client,
        runner,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_crawl_site_job_reports_run_summary() {
    let mock_server = MockServer::start().await;
    mount_html(&mock_server, "/notice", policy_html("Notice", "Tender opens"), 1).await;

    let h = harness(vec![target(
        "gov_0",
        vec![format!("{}/notice", mock_server.uri())],
    )]);

    let job_id = h.client.submit_crawl_site("gov_0");
    let before = h.client.status(job_id).unwrap();
    assert_eq!(before.status, JobStatus::Queued);
    assert!(before.result.is_none());

    assert_eq!(
        h.runner.run_once(QueueName::Crawl, Utc::now()).await,
        Some((job_id, JobStatus::Succeeded))
    );

    let after = h.client.status(job_id).unwrap();
    assert!(after.ready);
    let result = after.result.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["saved"], 1);
    assert_eq!(result["total_sites"], 1);
}

#[tokio::test]
async fn test_unknown_site_fails_without_retry() {
    let h = harness(vec![]);

    let job_id = h.client.submit_crawl_site("nowhere");
    assert_eq!(
        h.runner.run_once(QueueName::Crawl, Utc::now()).await,
        Some((job_id, JobStatus::Failed))
    );
    assert_eq!(h.broker.pending_count(QueueName::Crawl), 0);

    let view = h.client.status(job_id).unwrap();
    let result = view.result.unwrap();
    assert_eq!(result["exhausted"], false);
    assert_eq!(view.error.as_deref(), Some("unknown site: nowhere"));
}

#[tokio::test]
async fn test_unreachable_site_retries_three_times_then_fails() {
    let h = harness(vec![target("gov_0", vec!["http://127.0.0.1:1/".to_string()])]);
    let job_id = h.client.submit_crawl_site("gov_0");

    // Walk a simulated clock past each 300s backoff
    let start = Utc::now();
    let mut statuses = Vec::new();
    for step in 0..8 {
        let now = start + Duration::seconds(300 * step);
        if let Some((_, status)) = h.runner.run_once(QueueName::Crawl, now).await {
            statuses.push(status);
        }
    }

    assert_eq!(
        statuses,
        vec![
            JobStatus::Retrying,
            JobStatus::Retrying,
            JobStatus::Retrying,
            JobStatus::Failed
        ]
    );

    let record = h.broker.get_record(job_id, start).unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    let result = record.result.unwrap();
    assert_eq!(result["exhausted"], true);
    assert_eq!(result["attempts"], 3);
    assert_eq!(result["message"], "crawl_site failed after 3 retries");
}

#[tokio::test]
async fn test_scheduled_crawl_past_its_window_never_runs() {
    let mock_server = MockServer::start().await;
    // Any fetch would violate this expectation
    mount_html(&mock_server, "/notice", policy_html("Notice", "Late"), 0).await;

    let h = harness(vec![target(
        "gov_0",
        vec![format!("{}/notice", mock_server.uri())],
    )]);
    let scheduler = PeriodicScheduler::new(default_schedule(), h.broker.clone());

    let fired_at = Utc::now()
        .date_naive()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        .and_utc();
    let fired = scheduler.tick(fired_at);
    let crawl_job = fired
        .iter()
        .copied()
        .find(|id| h.broker.get_record(*id, fired_at).map(|r| r.kind) == Some(JobKind::ScheduledCrawl))
        .unwrap();

    // The worker only gets to it after downtime longer than the 5 minute window
    let late = fired_at + Duration::seconds(301);
    assert_eq!(
        h.runner.run_once(QueueName::Crawl, late).await,
        Some((crawl_job, JobStatus::Expired))
    );
    assert!(h.runner.run_once(QueueName::Crawl, late).await.is_none());
    assert_eq!(
        h.broker.get_record(crawl_job, late).unwrap().status,
        JobStatus::Expired
    );
}

#[tokio::test]
async fn test_batch_crawl_surfaces_partial_completion_per_job() {
    let mock_server = MockServer::start().await;
    mount_html(&mock_server, "/notice", policy_html("Notice", "Batch member"), 1).await;

    let h = harness(vec![target(
        "gov_0",
        vec![format!("{}/notice", mock_server.uri())],
    )]);

    let batch_id = h
        .client
        .submit(JobKind::BatchCrawl, json!({"site_ids": ["gov_0", "missing"]}));
    assert_eq!(
        h.runner.run_once(QueueName::Crawl, Utc::now()).await,
        Some((batch_id, JobStatus::Succeeded))
    );

    let batch = h.client.status(batch_id).unwrap().result.unwrap();
    assert_eq!(batch["site_count"], 2);
    let group_id = serde_json::from_value(batch["job_id"].clone()).unwrap();

    while h.runner.run_once(QueueName::Crawl, Utc::now()).await.is_some() {}

    let members = h.client.group_status(group_id);
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].status, JobStatus::Succeeded);
    assert_eq!(members[1].status, JobStatus::Failed);
    assert!(members.iter().all(|m| m.ready));
}
