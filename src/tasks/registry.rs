//! Handler registry mapping job kinds to their handlers
//!
//! Each stage registers its handlers at startup; the runner looks them up by
//! [`JobKind`] when a job is claimed.

use crate::tasks::job::{Job, JobKind, JobOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Executes one kind of job
///
/// Handlers report failure through [`JobOutcome`]; the runner owns retries.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobOutcome;
}

/// Adapts an async closure into a [`JobHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobOutcome> + Send + 'static,
{
    async fn handle(&self, job: &Job) -> JobOutcome {
        (self.0)(job.clone()).await
    }
}

/// Registry that maps job kinds to handlers
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `kind`, replacing any earlier one
    pub fn register(&mut self, kind: JobKind, handler: impl JobHandler + 'static) {
        self.handlers.insert(kind, Arc::new(handler));
    }

    /// Registers an async closure as the handler for `kind`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use policy_pulse::tasks::{HandlerRegistry, JobKind, JobOutcome};
    ///
    /// let mut registry = HandlerRegistry::new();
    /// registry.register_fn(JobKind::ScheduledClean, |_job| async move {
    ///     JobOutcome::Success(serde_json::json!({"cleaned": 0}))
    /// });
    /// ```
    pub fn register_fn<F, Fut>(&mut self, kind: JobKind, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        self.register(kind, FnHandler(handler));
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, in declaration order
    pub fn kinds(&self) -> Vec<JobKind> {
        JobKind::all()
            .iter()
            .copied()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    /// Runs the handler registered for the job's kind
    ///
    /// A kind with no handler is a fatal failure.
    pub async fn execute(&self, job: &Job) -> JobOutcome {
        match self.handlers.get(&job.kind) {
            Some(handler) => handler.handle(job).await,
            None => JobOutcome::Fatal(format!("no handler registered for {}", job.kind)),
        }
    }
}
