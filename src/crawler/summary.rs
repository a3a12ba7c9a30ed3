//! Run summaries returned by the orchestrator

use serde::{Deserialize, Serialize};

/// Outcome of one page within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOutcome {
    Saved,
    /// Duplicate, either within the run or against the store
    Skipped,
    Error,
}

/// Per-target counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target_id: String,
    pub saved: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl TargetOutcome {
    pub fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Saved => self.saved += 1,
            PageOutcome::Skipped => self.skipped += 1,
            PageOutcome::Error => self.errors += 1,
        }
    }
}

/// Aggregate result of one orchestrator run
///
/// Never persisted by the crawl pipeline; it is returned to the caller or
/// stored as a job result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// False only when the run failed as a whole before targets were walked
    pub success: bool,
    pub total_sites: usize,
    pub saved: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Set when at least one fetch failed transiently
    pub transient_errors: bool,
    pub message: String,
    #[serde(default)]
    pub outcomes: Vec<TargetOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Aggregates per-target outcomes
    pub fn from_outcomes(outcomes: Vec<TargetOutcome>, transient_errors: bool) -> Self {
        let saved = outcomes.iter().map(|o| o.saved).sum();
        let skipped = outcomes.iter().map(|o| o.skipped).sum();
        let errors = outcomes.iter().map(|o| o.errors).sum();
        let total_sites = outcomes.len();

        Self {
            success: true,
            total_sites,
            saved,
            skipped,
            errors,
            transient_errors,
            message: format!(
                "Crawl task completed. {} pages saved from {} sites.",
                saved, total_sites
            ),
            outcomes,
            error: None,
        }
    }

    /// A run that failed before any target was walked
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            total_sites: 0,
            saved: 0,
            skipped: 0,
            errors: 0,
            transient_errors: false,
            message: format!("Crawl task failed: {}", error),
            outcomes: Vec::new(),
            error: Some(error),
        }
    }
}
