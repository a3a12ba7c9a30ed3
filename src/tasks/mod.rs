//! Task execution layer: queues, retries, schedules and status lookup
//!
//! # Components
//!
//! - `job`: job kinds, queue routing, retry policies and stored records
//! - `broker`: the queue/result-store seam and its in-process implementation
//! - `registry`: maps job kinds to handlers
//! - `runner`: worker pool that executes and settles jobs
//! - `scheduler`: cadence parsing and the periodic scheduler
//! - `client`: submission and status lookup for callers
//! - `handlers`: handlers for the crawl job kinds

mod broker;
mod client;
mod handlers;
mod job;
mod registry;
mod runner;
mod scheduler;

pub use broker::{enqueue, Broker, MemoryBroker};
pub use client::{GroupHandle, JobClient};
pub use handlers::{
    register_crawl_handlers, summary_outcome, BatchCrawlHandler, CrawlSiteHandler,
    MaintenanceHandler, ScheduledCrawlHandler,
};
pub use job::{
    failure_payload, Backoff, Job, JobKind, JobOutcome, JobRecord, JobStatusView, QueueName,
    RetryPolicy,
};
pub use registry::{FnHandler, HandlerRegistry, JobHandler};
pub use runner::{TaskRunner, TaskRunnerConfig};
pub use scheduler::{
    default_schedule, parse_utc_offset, schedule_from_config, Cadence, CadenceError, CronExpr, PeriodicScheduler,
    ScheduleEntry,
};
