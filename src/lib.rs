//! Policy-Pulse: crawl-and-dispatch for government and procurement sites
//!
//! This crate compiles a region/organization site tree into crawl targets,
//! fetches and extracts pages politely, deduplicates them against prior runs,
//! and wraps crawl runs as retryable jobs routed across isolated queues.

pub mod config;
pub mod crawler;
pub mod sites;
pub mod state;
pub mod storage;
pub mod tasks;

use thiserror::Error;

/// Main error type for Policy-Pulse operations
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are the only errors fatal to process startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse site tree: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Policy-Pulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawledPage, RunSummary};
pub use sites::{Category, CrawlTarget};
pub use state::{JobStatus, PageStatus};
