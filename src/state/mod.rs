//! Lifecycle states for crawled pages and jobs
//!
//! # Components
//!
//! - `PageStatus`: processing status of a stored page, advanced by downstream consumers
//! - `JobStatus`: state of a job in the task execution layer

mod job_status;
mod page_status;

// Re-export main types
pub use job_status::JobStatus;
pub use page_status::PageStatus;
