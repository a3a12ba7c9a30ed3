//! Queue broker: per-queue delivery plus a job result store
//!
//! [`MemoryBroker`] keeps everything in process. Delivery is at-least-once:
//! a claimed job stays in flight until acked, and is redelivered if the
//! visibility timeout passes first.

use crate::config::TasksConfig;
use crate::state::JobStatus;
use crate::tasks::job::{failure_payload, Job, JobRecord, QueueName};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

/// Publish/claim per named queue, plus get/set of job records
pub trait Broker: Send + Sync {
    /// Makes `job` claimable from its queue once `visible_at` has passed
    fn publish(&self, job: Job, visible_at: DateTime<Utc>);

    /// Takes the oldest visible job from `queue`
    fn claim(&self, queue: QueueName, now: DateTime<Utc>) -> Option<Job>;

    /// Confirms a claimed job was handled
    fn ack(&self, job_id: Uuid);

    fn set_record(&self, record: JobRecord);

    /// The job's record, unless it is older than the retention window
    fn get_record(&self, job_id: Uuid, now: DateTime<Utc>) -> Option<JobRecord>;

    /// Ids of jobs fanned out under `group_id`, in submission order
    fn group_members(&self, group_id: Uuid) -> Vec<Uuid>;

    /// Settles claimed jobs never acked within the visibility timeout
    ///
    /// Each redelivery counts as an attempt; a job with none left is failed
    /// instead. Returns how many stale jobs were settled.
    fn requeue_stale(&self, _now: DateTime<Utc>) -> usize {
        0
    }

    /// Drops records older than the retention window
    fn purge_expired(&self, _now: DateTime<Utc>) -> usize {
        0
    }
}

/// Publishes a new job and records it as queued
pub fn enqueue(broker: &dyn Broker, job: Job, now: DateTime<Utc>) -> Uuid {
    let job_id = job.id;
    broker.set_record(JobRecord::new(&job, JobStatus::Queued, now));
    broker.publish(job, now);
    job_id
}

#[derive(Debug)]
struct Pending {
    job: Job,
    visible_at: DateTime<Utc>,
}

#[derive(Debug)]
struct InFlight {
    job: Job,
    claimed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<QueueName, VecDeque<Pending>>,
    in_flight: HashMap<Uuid, InFlight>,
    records: HashMap<Uuid, JobRecord>,
    groups: HashMap<Uuid, Vec<Uuid>>,
}

/// In-process broker with visibility delays and bounded result retention
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    retention: Duration,
    visibility_timeout: Duration,
}

impl MemoryBroker {
    pub fn new(retention: Duration, visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            retention,
            visibility_timeout,
        }
    }

    pub fn from_config(config: &TasksConfig) -> Self {
        Self::new(
            Duration::seconds(config.result_retention_secs as i64),
            Duration::seconds(config.visibility_timeout_secs as i64),
        )
    }

    /// Jobs waiting in `queue`, visible or not
    pub fn pending_count(&self, queue: QueueName) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(&queue).map_or(0, VecDeque::len)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::from_config(&TasksConfig::default())
    }
}

impl Broker for MemoryBroker {
    fn publish(&self, job: Job, visible_at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();

        if let Some(group_id) = job.group_id {
            let members = state.groups.entry(group_id).or_default();
            if !members.contains(&job.id) {
                members.push(job.id);
            }
        }

        tracing::debug!(job_id = %job.id, queue = %job.queue, "published {}", job.kind);
        state
            .queues
            .entry(job.queue)
            .or_default()
            .push_back(Pending { job, visible_at });
    }

    fn claim(&self, queue: QueueName, now: DateTime<Utc>) -> Option<Job> {
        let mut state = self.state.lock().unwrap();

        let pending = state.queues.get_mut(&queue)?;
        let index = pending.iter().position(|p| p.visible_at <= now)?;
        let job = pending.remove(index)?.job;

        state.in_flight.insert(
            job.id,
            InFlight {
                job: job.clone(),
                claimed_at: now,
            },
        );
        Some(job)
    }

    fn ack(&self, job_id: Uuid) {
        self.state.lock().unwrap().in_flight.remove(&job_id);
    }

    fn set_record(&self, record: JobRecord) {
        self.state.lock().unwrap().records.insert(record.job_id, record);
    }

    fn get_record(&self, job_id: Uuid, now: DateTime<Utc>) -> Option<JobRecord> {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(&job_id)
            .filter(|record| now - record.updated_at <= self.retention)
            .cloned()
    }

    fn group_members(&self, group_id: Uuid) -> Vec<Uuid> {
        let state = self.state.lock().unwrap();
        state.groups.get(&group_id).cloned().unwrap_or_default()
    }

    fn requeue_stale(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().unwrap();

        let stale: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, flight)| now - flight.claimed_at > self.visibility_timeout)
            .map(|(id, _)| *id)
            .collect();

        for job_id in &stale {
            let Some(flight) = state.in_flight.remove(job_id) else {
                continue;
            };
            let mut job = flight.job;
            let error = "worker lost before acknowledging";

            if !job.can_retry() {
                tracing::error!(job_id = %job_id, attempts = job.attempt, "failing unacknowledged {}", job.kind);
                let record = JobRecord::new(&job, JobStatus::Failed, now)
                    .with_result(failure_payload(&job, error, true))
                    .with_error(error);
                state.records.insert(job.id, record);
                continue;
            }

            job.attempt += 1;
            job.expires_at = None;
            tracing::warn!(job_id = %job_id, attempt = job.attempt, "redelivering unacknowledged {}", job.kind);
            state.records.insert(
                job.id,
                JobRecord::new(&job, JobStatus::Retrying, now).with_error(error),
            );
            state
                .queues
                .entry(job.queue)
                .or_default()
                .push_back(Pending {
                    job,
                    visible_at: now,
                });
        }

        stale.len()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.records.len();
        state
            .records
            .retain(|_, record| now - record.updated_at <= self.retention);

        let BrokerState { records, groups, .. } = &mut *state;
        groups.retain(|_, members| members.iter().any(|id| records.contains_key(id)));

        before - state.records.len()
    }
}
