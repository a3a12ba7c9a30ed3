use serde::Deserialize;

/// Main configuration structure for Policy-Pulse
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub sites: SitesConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    /// Periodic job entries; empty means the built-in schedule
    #[serde(default)]
    pub schedule: Vec<ScheduleConfigEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Upper bound of the randomized per-fetch politeness sleep (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    /// Overall per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of in-flight requests across all hosts
    #[serde(rename = "max-connections", default = "default_max_connections")]
    pub max_connections: u32,

    /// Maximum number of in-flight requests to a single host
    #[serde(rename = "max-connections-per-host", default = "default_max_connections_per_host")]
    pub max_connections_per_host: u32,

    /// Deepest site-tree level that still produces targets
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of targets sampled when a batch names no explicit ids
    #[serde(rename = "sample-size", default = "default_sample_size")]
    pub sample_size: usize,

    /// Maximum number of pages saved per target in one run
    #[serde(rename = "max-pages-per-target", default = "default_max_pages_per_target")]
    pub max_pages_per_target: usize,

    /// Check the store before fetching a URL saved by an earlier run
    #[serde(rename = "skip-known-urls", default = "default_true")]
    pub skip_known_urls: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            politeness_delay_ms: default_politeness_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_connections: default_max_connections(),
            max_connections_per_host: default_max_connections_per_host(),
            max_depth: default_max_depth(),
            sample_size: default_sample_size(),
            max_pages_per_target: default_max_pages_per_target(),
            skip_known_urls: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Where the site tree and standalone site definitions live
#[derive(Debug, Clone, Deserialize)]
pub struct SitesConfig {
    /// JSON document holding the region/organization tree
    #[serde(rename = "tree-path")]
    pub tree_path: Option<String>,

    /// Directory of `.toml` / `.yaml` site definitions
    #[serde(rename = "sites-dir")]
    pub sites_dir: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Job execution layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    #[serde(rename = "workers-per-queue", default = "default_workers_per_queue")]
    pub workers_per_queue: usize,

    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long finished job results stay queryable
    #[serde(rename = "result-retention-secs", default = "default_result_retention_secs")]
    pub result_retention_secs: u64,

    /// How long a claimed job may stay unacknowledged before redelivery
    #[serde(rename = "visibility-timeout-secs", default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Fixed offset schedule cadences are read in, e.g. `+08:00`
    #[serde(rename = "schedule-utc-offset", default = "default_schedule_utc_offset")]
    pub schedule_utc_offset: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            workers_per_queue: default_workers_per_queue(),
            poll_interval_ms: default_poll_interval_ms(),
            result_retention_secs: default_result_retention_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            schedule_utc_offset: default_schedule_utc_offset(),
        }
    }
}

/// One `[[schedule]]` entry as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfigEntry {
    pub name: String,

    /// Job kind name, e.g. `scheduled_crawl`
    pub job: String,

    /// `every 30m`, `every 1h`, `daily 02:00`, or a 5-field cron expression
    pub cadence: String,

    #[serde(rename = "expires-secs")]
    pub expires_secs: Option<u64>,
}

fn default_politeness_delay_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    100
}

fn default_max_connections_per_host() -> u32 {
    10
}

fn default_max_depth() -> u32 {
    5
}

fn default_sample_size() -> usize {
    5
}

fn default_max_pages_per_target() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_workers_per_queue() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_result_retention_secs() -> u64 {
    3600
}

fn default_visibility_timeout_secs() -> u64 {
    600
}

fn default_schedule_utc_offset() -> String {
    "+00:00".to_string()
}
