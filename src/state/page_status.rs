/// Page status definitions for stored pages
///
/// The crawl subsystem only ever writes `Pending`; the remaining states are
/// transitions made by the cleaning and analysis stages.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of a crawled page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Freshly crawled, not yet picked up downstream
    #[default]
    Pending,

    /// A downstream stage is working on the page
    Processing,

    /// Downstream processing finished
    Processed,

    /// Downstream processing gave up on the page
    Failed,
}

impl PageStatus {
    /// Returns true if no further downstream processing is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// Converts the status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stored string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible page statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Processed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
