//! Job model: kinds, queue routing, retry policy and results

use crate::state::JobStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Named, isolated work queues
///
/// Load on one stage never starves another: each job kind is pinned to
/// exactly one queue and each queue has its own workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Crawl,
    Clean,
    Analyze,
    Notification,
    Default,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Clean => "clean",
            Self::Analyze => "analyze",
            Self::Notification => "notification",
            Self::Default => "default",
        }
    }

    pub fn all() -> &'static [QueueName] {
        &[
            Self::Crawl,
            Self::Clean,
            Self::Analyze,
            Self::Notification,
            Self::Default,
        ]
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delay before a failed job becomes visible again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    None,
    Fixed { secs: u64 },
}

impl Backoff {
    pub fn delay(&self) -> Duration {
        match self {
            Self::None => Duration::zero(),
            Self::Fixed { secs } => Duration::seconds(*secs as i64),
        }
    }
}

/// Retry limits for one job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first execution
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_attempts: 0,
        backoff: Backoff::None,
    };

    pub const fn fixed(max_attempts: u32, secs: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { secs },
        }
    }
}

/// Every job the system knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CrawlSite,
    ScheduledCrawl,
    BatchCrawl,
    ScheduledClean,
    ScheduledAnalyze,
    ScheduledNotification,
    SystemMaintenance,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CrawlSite => "crawl_site",
            Self::ScheduledCrawl => "scheduled_crawl",
            Self::BatchCrawl => "batch_crawl",
            Self::ScheduledClean => "scheduled_clean",
            Self::ScheduledAnalyze => "scheduled_analyze",
            Self::ScheduledNotification => "scheduled_notification",
            Self::SystemMaintenance => "system_maintenance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.name() == name)
    }

    pub fn all() -> &'static [JobKind] {
        &[
            Self::CrawlSite,
            Self::ScheduledCrawl,
            Self::BatchCrawl,
            Self::ScheduledClean,
            Self::ScheduledAnalyze,
            Self::ScheduledNotification,
            Self::SystemMaintenance,
        ]
    }

    /// The one queue this kind is routed to
    pub fn queue(&self) -> QueueName {
        match self {
            Self::CrawlSite | Self::ScheduledCrawl | Self::BatchCrawl => QueueName::Crawl,
            Self::ScheduledClean => QueueName::Clean,
            Self::ScheduledAnalyze => QueueName::Analyze,
            Self::ScheduledNotification => QueueName::Notification,
            Self::SystemMaintenance => QueueName::Default,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::CrawlSite => RetryPolicy::fixed(3, 300),
            Self::ScheduledCrawl => RetryPolicy::fixed(2, 600),
            _ => RetryPolicy::NONE,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One unit of work travelling through a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub queue: QueueName,
    pub payload: Value,
    /// Retries already performed; 0 on first execution
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Set when the job was fanned out as part of a batch
    pub group_id: Option<Uuid>,
    pub enqueued_at: DateTime<Utc>,
    /// Scheduled occurrences not started by this time are dropped
    pub expires_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a job routed and retried according to its kind
    pub fn new(kind: JobKind, payload: Value, now: DateTime<Utc>) -> Self {
        let policy = kind.retry_policy();
        Self {
            id: Uuid::new_v4(),
            kind,
            queue: kind.queue(),
            payload,
            attempt: 0,
            max_attempts: policy.max_attempts,
            backoff: policy.backoff,
            group_id: None,
            enqueued_at: now,
            expires_at: None,
        }
    }

    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_expiry(mut self, window: Duration) -> Self {
        self.expires_at = Some(self.enqueued_at + window);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// What a handler reports back to the runner
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(Value),
    /// Failed in a way worth retrying while attempts remain
    Retryable(String),
    /// Failed permanently; never retried
    Fatal(String),
}

/// Stored status of a job, queryable until the retention window passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub queue: QueueName,
    pub group_id: Option<Uuid>,
    pub status: JobStatus,
    pub attempt: u32,
    /// Success value, or the structured failure payload
    pub result: Option<Value>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job: &Job, status: JobStatus, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            queue: job.queue,
            group_id: job.group_id,
            status,
            attempt: job.attempt,
            result: None,
            error: None,
            updated_at: now,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Structured result for a job that ended in `Failed`
///
/// `exhausted` tells callers whether retries ran out or the failure was
/// fatal from the start.
pub fn failure_payload(job: &Job, error: &str, exhausted: bool) -> Value {
    json!({
        "success": false,
        "error": error,
        "message": format!("{} failed after {} retries", job.kind, job.attempt),
        "exhausted": exhausted,
        "attempts": job.attempt,
    })
}

/// Caller-facing view of a job's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub ready: bool,
    pub attempt: u32,
    /// Present once the job is terminal
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl From<JobRecord> for JobStatusView {
    fn from(record: JobRecord) -> Self {
        let ready = record.status.is_terminal();
        Self {
            job_id: record.job_id,
            kind: record.kind,
            status: record.status,
            ready,
            attempt: record.attempt,
            result: if ready { record.result } else { None },
            error: record.error,
        }
    }
}
