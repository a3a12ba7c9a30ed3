/// Job state definitions for the task execution layer
///
/// ```text
/// Queued -> Running -> Succeeded
///                   -> Retrying -> Queued (after backoff)
///                   -> Failed
/// Queued -> Expired (fired occurrence not started within its window)
/// ```
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    // ===== Active States =====
    /// Waiting in its queue for a worker
    Queued,

    /// A worker is executing the handler
    Running,

    /// Handler failed with attempts left; re-queued behind a backoff delay
    Retrying,

    // ===== Terminal States =====
    /// Handler returned successfully
    Succeeded,

    /// Handler failed fatally or exhausted its attempts
    Failed,

    /// Scheduled occurrence was not started within its expiry window
    Expired,
}

impl JobStatus {
    /// Returns true if this is a terminal state (no further execution)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Expired)
    }

    /// Converts the job status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Parses a job status from its stored string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "retrying" => Some(Self::Retrying),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
