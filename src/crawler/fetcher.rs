//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawl pipeline, including:
//! - Building the shared HTTP client with the crawler's user agent
//! - The randomized politeness sleep before every request
//! - Global and per-host connection budgets
//! - Classifying failures as transient or non-fetchable

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::sites::CrawlTarget;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_ZH: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Floor of the politeness sleep when the configured delay allows it
const MIN_POLITENESS_DELAY_MS: u64 = 1000;

/// How a fetch failed, which decides whether the job layer retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Timeout or transport failure; eligible for retry
    Transient,
    /// Non-200 status or non-HTML content; never retried
    NonFetchable,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::NonFetchable => write!(f, "non-fetchable"),
        }
    }
}

/// A failed fetch of one URL
#[derive(Debug, Clone, Error)]
#[error("{kind} failure fetching {url}: {message}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    fn transient(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            kind: FetchErrorKind::Transient,
            message: message.into(),
        }
    }

    fn non_fetchable(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            kind: FetchErrorKind::NonFetchable,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL as requested
    pub url: String,
    /// Body decoded leniently; invalid bytes become U+FFFD
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Formats the crawler's user agent
///
/// Format: `CrawlerName/Version (Compatible; Email: ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (Compatible; Email: {})",
        config.crawler_name, config.crawler_version, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Supplies the request timeout and per-host pool size
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_ZH));

    Client::builder()
        .user_agent(user_agent_string(user_agent))
        .default_headers(headers)
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(crawler.max_connections_per_host as usize)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Bounds of the politeness sleep in milliseconds for a configured delay
pub fn politeness_bounds(delay_ms: u64) -> (u64, u64) {
    (MIN_POLITENESS_DELAY_MS.min(delay_ms), delay_ms)
}

/// Rate-limited page fetcher
///
/// Cloning is cheap and clones share the connection pool and the
/// connection budgets; nothing else is kept between calls.
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    politeness_delay_ms: u64,
    connections: Arc<Semaphore>,
    per_host: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    per_host_limit: usize,
}

impl PageFetcher {
    /// Creates a fetcher around an already built client
    pub fn new(client: Client, crawler: &CrawlerConfig) -> Self {
        Self {
            client,
            politeness_delay_ms: crawler.politeness_delay_ms,
            connections: Arc::new(Semaphore::new(crawler.max_connections as usize)),
            per_host: Arc::new(Mutex::new(HashMap::new())),
            per_host_limit: crawler.max_connections_per_host as usize,
        }
    }

    /// Builds the client from config and wraps it
    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, crawler)?;
        Ok(Self::new(client, crawler))
    }

    /// Fetches one start URL of a target
    ///
    /// # Request Flow
    ///
    /// 1. Sleep a random politeness delay
    /// 2. Take a global connection permit, then a per-host permit
    /// 3. Send GET (redirects are followed by the client)
    /// 4. Accept only HTTP 200 with an HTML content type
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Timeout | Transient |
    /// | Connection / transport error | Transient |
    /// | Body read error | Transient |
    /// | Malformed URL | NonFetchable |
    /// | Status other than 200 | NonFetchable |
    /// | Content-Type not `text/html` | NonFetchable |
    pub async fn fetch(&self, target: &CrawlTarget, url: &str) -> Result<FetchedPage, FetchError> {
        self.politeness_sleep().await;

        let _global = self
            .connections
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FetchError::transient(url, e.to_string()))?;
        let _host = self.acquire_host_permit(url).await?;

        tracing::info!("Crawling {} for target {}", url, target.id);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::non_fetchable(url, format!("invalid request: {}", e))
            } else if e.is_timeout() {
                FetchError::transient(url, "request timeout")
            } else {
                FetchError::transient(url, e.to_string())
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!("HTTP {} for {}", status.as_u16(), url);
            return Err(FetchError::non_fetchable(url, format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/html") {
            tracing::info!("Non-HTML content at {}: {}", url, content_type);
            return Err(FetchError::non_fetchable(
                url,
                format!("expected HTML, got '{}'", content_type),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transient(url, format!("failed to read body: {}", e)))?;

        Ok(FetchedPage {
            url: url.to_string(),
            body,
            fetched_at: Utc::now(),
        })
    }

    async fn politeness_sleep(&self) {
        if self.politeness_delay_ms == 0 {
            return;
        }

        let (low, high) = politeness_bounds(self.politeness_delay_ms);
        let delay = fastrand::u64(low..=high);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    async fn acquire_host_permit(&self, url: &str) -> Result<OwnedSemaphorePermit, FetchError> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .ok_or_else(|| FetchError::non_fetchable(url, "URL has no host"))?;

        let semaphore = {
            let mut per_host = self.per_host.lock().unwrap();
            per_host
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
                .clone()
        };

        semaphore
            .acquire_owned()
            .await
            .map_err(|e| FetchError::transient(url, e.to_string()))
    }
}
