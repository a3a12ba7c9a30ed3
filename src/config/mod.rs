//! Configuration module for Policy-Pulse
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The site tree and standalone site definitions referenced from `[sites]` are
//! loaded separately by [`crate::sites`].
//!
//! # Example
//!
//! ```no_run
//! use policy_pulse::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Sampling {} targets per batch", config.crawler.sample_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, ScheduleConfigEntry, SitesConfig, TasksConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
