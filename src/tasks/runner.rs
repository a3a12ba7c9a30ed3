//! Task runner: workers that claim, execute and settle jobs
//!
//! # Architecture
//!
//! ```text
//! TaskRunner
//!     │
//!     ├─► claim from one queue (Broker)
//!     ├─► drop if past its expiry window  → Expired
//!     ├─► execute via HandlerRegistry
//!     └─► settle the outcome
//!           Success                         → Succeeded
//!           Retryable, attempts remain      → Retrying, republished after backoff
//!           Retryable, attempts exhausted   → Failed (exhausted = true)
//!           Fatal                           → Failed (exhausted = false)
//! ```
//!
//! Backoff never blocks a worker: the job is republished with a later
//! visibility time and the worker moves on. A handler that panics is
//! settled like a retryable failure and its worker keeps running.

use crate::config::TasksConfig;
use crate::state::JobStatus;
use crate::tasks::broker::Broker;
use crate::tasks::job::{failure_payload, Job, JobOutcome, JobRecord, QueueName};
use crate::tasks::registry::HandlerRegistry;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct TaskRunnerConfig {
    pub workers_per_queue: usize,
    /// How long an idle worker waits before polling its queue again
    pub poll_interval: Duration,
}

impl Default for TaskRunnerConfig {
    fn default() -> Self {
        Self::from(&TasksConfig::default())
    }
}

impl From<&TasksConfig> for TaskRunnerConfig {
    fn from(config: &TasksConfig) -> Self {
        Self {
            workers_per_queue: config.workers_per_queue,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Executes jobs from every queue
#[derive(Clone)]
pub struct TaskRunner {
    broker: Arc<dyn Broker>,
    registry: Arc<HandlerRegistry>,
    config: TaskRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl TaskRunner {
    pub fn new(broker: Arc<dyn Broker>, registry: HandlerRegistry, config: TaskRunnerConfig) -> Self {
        Self {
            broker,
            registry: Arc::new(registry),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shutdown flag shared by every worker this runner spawns
    ///
    /// Call `store(true, Ordering::SeqCst)` on it to stop the workers.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Claims and settles at most one job from `queue`
    ///
    /// Returns the job id and the status it was left in, or `None` when no
    /// job was visible.
    pub async fn run_once(&self, queue: QueueName, now: DateTime<Utc>) -> Option<(uuid::Uuid, JobStatus)> {
        let job = self.broker.claim(queue, now)?;
        let job_id = job.id;
        let status = self.process(job, now).await;
        Some((job_id, status))
    }

    async fn process(&self, mut job: Job, now: DateTime<Utc>) -> JobStatus {
        if job.is_expired(now) {
            info!(job_id = %job.id, kind = %job.kind, "dropping job past its expiry window");
            self.broker.set_record(
                JobRecord::new(&job, JobStatus::Expired, now).with_error("expired before it started"),
            );
            self.broker.ack(job.id);
            return JobStatus::Expired;
        }

        debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempt, "executing job");
        self.broker
            .set_record(JobRecord::new(&job, JobStatus::Running, now));

        let outcome = self.execute_contained(&job).await;

        match outcome {
            JobOutcome::Success(result) => {
                info!(job_id = %job.id, kind = %job.kind, "job succeeded");
                self.broker
                    .set_record(JobRecord::new(&job, JobStatus::Succeeded, now).with_result(result));
                self.broker.ack(job.id);
                JobStatus::Succeeded
            }
            JobOutcome::Retryable(error) if job.can_retry() => {
                self.broker.ack(job.id);
                job.attempt += 1;
                job.expires_at = None;
                let visible_at = now + job.backoff.delay();

                warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    attempt = job.attempt,
                    max_attempts = job.max_attempts,
                    error = %error,
                    "job failed, retrying at {}",
                    visible_at
                );
                self.broker
                    .set_record(JobRecord::new(&job, JobStatus::Retrying, now).with_error(error));
                self.broker.publish(job, visible_at);
                JobStatus::Retrying
            }
            JobOutcome::Retryable(error) => self.fail(&job, &error, true, now),
            JobOutcome::Fatal(error) => self.fail(&job, &error, false, now),
        }
    }

    /// Runs the handler on its own task so a panic settles the job instead
    /// of unwinding into the worker
    async fn execute_contained(&self, job: &Job) -> JobOutcome {
        let registry = self.registry.clone();
        let handler_job = job.clone();
        let handle = tokio::spawn(async move { registry.execute(&handler_job).await });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %job.id, kind = %job.kind, "handler aborted: {}", e);
                JobOutcome::Retryable(format!("handler panicked: {}", e))
            }
        }
    }

    fn fail(&self, job: &Job, error: &str, exhausted: bool, now: DateTime<Utc>) -> JobStatus {
        error!(
            job_id = %job.id,
            kind = %job.kind,
            attempts = job.attempt,
            exhausted,
            error = %error,
            "job failed"
        );
        self.broker.set_record(
            JobRecord::new(job, JobStatus::Failed, now)
                .with_result(failure_payload(job, error, exhausted))
                .with_error(error),
        );
        self.broker.ack(job.id);
        JobStatus::Failed
    }

    /// Starts `workers_per_queue` workers on every queue, plus housekeeping
    ///
    /// Workers exit once the shutdown flag is set.
    pub fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for queue in QueueName::all() {
            for worker in 0..self.config.workers_per_queue {
                let runner = self.clone();
                let queue = *queue;
                handles.push(tokio::spawn(async move {
                    runner.worker_loop(queue, worker).await;
                }));
            }
        }

        let runner = self.clone();
        handles.push(tokio::spawn(async move {
            runner.housekeeping_loop().await;
        }));

        info!(
            workers_per_queue = self.config.workers_per_queue,
            queues = QueueName::all().len(),
            "task workers started"
        );
        handles
    }

    async fn worker_loop(&self, queue: QueueName, worker: usize) {
        debug!(queue = %queue, worker, "worker starting");

        while !self.is_shutdown_requested() {
            if self.run_once(queue, Utc::now()).await.is_none() {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        debug!(queue = %queue, worker, "worker stopped");
    }

    async fn housekeeping_loop(&self) {
        while !self.is_shutdown_requested() {
            let now = Utc::now();
            let requeued = self.broker.requeue_stale(now);
            let purged = self.broker.purge_expired(now);
            if requeued > 0 || purged > 0 {
                debug!(requeued, purged, "broker housekeeping");
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::broker::{enqueue, MemoryBroker};
    use crate::tasks::job::JobKind;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    fn runner_with(registry: HandlerRegistry) -> (TaskRunner, Arc<MemoryBroker>) {
        let broker = Arc::new(MemoryBroker::default());
        let runner = TaskRunner::new(broker.clone(), registry, TaskRunnerConfig::default());
        (runner, broker)
    }

    #[tokio::test]
    async fn test_always_failing_job_retries_exactly_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::CrawlSite, move |_job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                JobOutcome::Retryable("upstream timeout".to_string())
            }
        });
        let (runner, broker) = runner_with(registry);

        let job_id = enqueue(broker.as_ref(), Job::new(JobKind::CrawlSite, json!({"site_id": "a"}), t0()), t0());

        let mut transitions = Vec::new();
        let mut now = t0();
        for _ in 0..10 {
            if let Some((_, status)) = runner.run_once(QueueName::Crawl, now).await {
                transitions.push(status);
            }
            now = now + ChronoDuration::seconds(300);
        }

        assert_eq!(
            transitions,
            vec![
                JobStatus::Retrying,
                JobStatus::Retrying,
                JobStatus::Retrying,
                JobStatus::Failed
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let record = broker.get_record(job_id, now).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        let result = record.result.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["exhausted"], true);
        assert_eq!(result["attempts"], 3);
        assert_eq!(result["error"], "upstream timeout");
    }

    #[tokio::test]
    async fn test_retry_waits_for_backoff() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::CrawlSite, |_job| async move {
            JobOutcome::Retryable("boom".to_string())
        });
        let (runner, broker) = runner_with(registry);
        enqueue(broker.as_ref(), Job::new(JobKind::CrawlSite, json!({}), t0()), t0());

        assert_eq!(runner.run_once(QueueName::Crawl, t0()).await.map(|r| r.1), Some(JobStatus::Retrying));
        assert!(runner
            .run_once(QueueName::Crawl, t0() + ChronoDuration::seconds(299))
            .await
            .is_none());
        assert!(runner
            .run_once(QueueName::Crawl, t0() + ChronoDuration::seconds(300))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_expired_scheduled_job_never_executes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::ScheduledCrawl, move |_job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                JobOutcome::Success(json!({}))
            }
        });
        let (runner, broker) = runner_with(registry);

        let job = Job::new(JobKind::ScheduledCrawl, json!({}), t0()).with_expiry(ChronoDuration::seconds(300));
        let job_id = enqueue(broker.as_ref(), job, t0());

        // Worker comes back long after the window, e.g. after downtime
        let late = t0() + ChronoDuration::seconds(301);
        assert_eq!(runner.run_once(QueueName::Crawl, late).await, Some((job_id, JobStatus::Expired)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(broker.get_record(job_id, late).unwrap().status, JobStatus::Expired);
        assert_eq!(broker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_fatal_fails_without_retry() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::CrawlSite, |_job| async move {
            JobOutcome::Fatal("unknown site".to_string())
        });
        let (runner, broker) = runner_with(registry);
        let job_id = enqueue(broker.as_ref(), Job::new(JobKind::CrawlSite, json!({}), t0()), t0());

        assert_eq!(runner.run_once(QueueName::Crawl, t0()).await, Some((job_id, JobStatus::Failed)));
        let result = broker.get_record(job_id, t0()).unwrap().result.unwrap();
        assert_eq!(result["exhausted"], false);
        assert_eq!(broker.pending_count(QueueName::Crawl), 0);
    }

    #[tokio::test]
    async fn test_success_records_result() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::ScheduledNotification, |_job| async move {
            JobOutcome::Success(json!({"sent": 2}))
        });
        let (runner, broker) = runner_with(registry);
        let job_id = enqueue(
            broker.as_ref(),
            Job::new(JobKind::ScheduledNotification, json!({}), t0()),
            t0(),
        );

        assert!(runner.run_once(QueueName::Crawl, t0()).await.is_none());
        assert_eq!(
            runner.run_once(QueueName::Notification, t0()).await,
            Some((job_id, JobStatus::Succeeded))
        );
        assert_eq!(broker.get_record(job_id, t0()).unwrap().result, Some(json!({"sent": 2})));
    }

    async fn crash(_job: Job) -> JobOutcome {
        panic!("handler state corrupted");
    }

    #[tokio::test]
    async fn test_panicking_handler_is_retried_then_failed() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::CrawlSite, crash);
        registry.register_fn(JobKind::ScheduledClean, crash);
        let (runner, broker) = runner_with(registry);

        let crawl_id = enqueue(broker.as_ref(), Job::new(JobKind::CrawlSite, json!({}), t0()), t0());
        let mut transitions = Vec::new();
        let mut now = t0();
        for _ in 0..8 {
            if let Some((_, status)) = runner.run_once(QueueName::Crawl, now).await {
                transitions.push(status);
            }
            now = now + ChronoDuration::seconds(300);
        }
        assert_eq!(
            transitions,
            vec![
                JobStatus::Retrying,
                JobStatus::Retrying,
                JobStatus::Retrying,
                JobStatus::Failed
            ]
        );
        let record = broker.get_record(crawl_id, now).unwrap();
        assert_eq!(record.result.unwrap()["exhausted"], true);
        assert!(record.error.unwrap().starts_with("handler panicked"));

        // No retries configured: fails on the first panic
        let clean_id = enqueue(broker.as_ref(), Job::new(JobKind::ScheduledClean, json!({}), t0()), t0());
        assert_eq!(
            runner.run_once(QueueName::Clean, t0()).await,
            Some((clean_id, JobStatus::Failed))
        );
        assert_eq!(broker.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_job() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(JobKind::ScheduledClean, |job| async move {
            if job.payload["panic"] == true {
                panic!("clean stage crashed");
            }
            JobOutcome::Success(json!({"cleaned": 1}))
        });
        let broker = Arc::new(MemoryBroker::default());
        let runner = TaskRunner::new(
            broker.clone(),
            registry,
            TaskRunnerConfig {
                workers_per_queue: 1,
                poll_interval: Duration::from_millis(10),
            },
        );

        let now = Utc::now();
        let bad_id = enqueue(
            broker.as_ref(),
            Job::new(JobKind::ScheduledClean, json!({"panic": true}), now),
            now,
        );
        let good_id = enqueue(
            broker.as_ref(),
            Job::new(JobKind::ScheduledClean, json!({"panic": false}), now),
            now,
        );

        let handles = runner.spawn_workers();

        let mut settled = false;
        for _ in 0..200 {
            let status = broker.get_record(good_id, Utc::now()).map(|r| r.status);
            if status == Some(JobStatus::Succeeded) {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(settled, "healthy job behind a panicking one was never run");
        assert_eq!(
            broker.get_record(bad_id, Utc::now()).map(|r| r.status),
            Some(JobStatus::Failed)
        );

        runner.request_shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_workers_stop_on_shutdown() {
        let (runner, _broker) = runner_with(HandlerRegistry::new());
        let runner = TaskRunner {
            config: TaskRunnerConfig {
                workers_per_queue: 1,
                poll_interval: Duration::from_millis(10),
            },
            ..runner
        };

        let handles = runner.spawn_workers();
        assert_eq!(handles.len(), QueueName::all().len() + 1);

        runner.request_shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
