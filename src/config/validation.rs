use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, ScheduleConfigEntry, TasksConfig, UserAgentConfig,
};
use crate::tasks::{parse_utc_offset, Cadence, JobKind};
use crate::ConfigError;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_tasks_config(&config.tasks)?;
    validate_schedule(&config.schedule)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_connections < 1 || config.max_connections > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_connections must be between 1 and 1000, got {}",
            config.max_connections
        )));
    }

    if config.max_connections_per_host < 1
        || config.max_connections_per_host > config.max_connections
    {
        return Err(ConfigError::Validation(format!(
            "max_connections_per_host must be between 1 and max_connections ({}), got {}",
            config.max_connections, config.max_connections_per_host
        )));
    }

    if config.sample_size < 1 {
        return Err(ConfigError::Validation(
            "sample_size must be >= 1".to_string(),
        ));
    }

    if config.max_pages_per_target < 1 {
        return Err(ConfigError::Validation(
            "max_pages_per_target must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_tasks_config(config: &TasksConfig) -> Result<(), ConfigError> {
    if config.workers_per_queue < 1 {
        return Err(ConfigError::Validation(
            "workers_per_queue must be >= 1".to_string(),
        ));
    }

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    parse_utc_offset(&config.schedule_utc_offset)
        .map_err(|e| ConfigError::Validation(format!("schedule-utc-offset: {}", e)))?;

    Ok(())
}

/// Validates `[[schedule]]` entries: known job kinds, parseable cadences,
/// unique names
fn validate_schedule(entries: &[ScheduleConfigEntry]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for entry in entries {
        if entry.name.is_empty() {
            return Err(ConfigError::Validation(
                "schedule entry name cannot be empty".to_string(),
            ));
        }

        if !names.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate schedule entry '{}'",
                entry.name
            )));
        }

        if JobKind::from_name(&entry.job).is_none() {
            return Err(ConfigError::Validation(format!(
                "schedule entry '{}' names unknown job '{}'",
                entry.name, entry.job
            )));
        }

        Cadence::parse(&entry.cadence).map_err(|e| {
            ConfigError::Validation(format!("schedule entry '{}': {}", entry.name, e))
        })?;

        if entry.expires_secs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "schedule entry '{}' must have expires_secs >= 1",
                entry.name
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
