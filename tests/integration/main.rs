//! Integration tests for Policy-Pulse
//!
//! These tests use wiremock to stand in for government sites and exercise
//! the crawl pipeline and the job layer end-to-end.

mod crawl_tests;
mod task_tests;

use policy_pulse::config::{CrawlerConfig, UserAgentConfig};
use policy_pulse::crawler::{CrawlOrchestrator, PageFetcher};
use policy_pulse::sites::{Category, CrawlTarget, ExtractionRules};
use policy_pulse::storage::{SharedStore, SqliteStore};
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Crawler settings with the politeness sleep disabled
pub fn test_crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        politeness_delay_ms: 0,
        request_timeout_secs: 5,
        ..CrawlerConfig::default()
    }
}

pub fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

pub fn open_store(db_path: &Path) -> SharedStore {
    Arc::new(Mutex::new(
        SqliteStore::new(db_path).expect("Failed to open test database"),
    ))
}

pub fn orchestrator(store: SharedStore) -> CrawlOrchestrator {
    orchestrator_with(store, &test_crawler_config())
}

pub fn orchestrator_with(store: SharedStore, crawler: &CrawlerConfig) -> CrawlOrchestrator {
    let fetcher =
        PageFetcher::from_config(&test_user_agent(), crawler).expect("Failed to build fetcher");
    CrawlOrchestrator::new(fetcher, store, crawler)
}

pub fn target(id: &str, start_urls: Vec<String>) -> CrawlTarget {
    CrawlTarget {
        id: id.to_string(),
        name: format!("{} bureau", id),
        region: "Test Province".to_string(),
        industry: None,
        depth: 0,
        start_urls,
        category: Category::Policy,
        rules: ExtractionRules::tree_defaults(),
    }
}

pub fn policy_html(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
        <h1 class="title">{title}</h1>
        <span class="date">2024年03月15日</span>
        <div class="content"><p>{body}</p></div>
        </body></html>"#
    )
}

/// Mounts an HTML page at `route`, expected to be fetched exactly `times` times
pub async fn mount_html(server: &MockServer, route: &str, html: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .expect(times)
        .mount(server)
        .await;
}
