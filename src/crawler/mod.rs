//! Crawl pipeline: fetch, extract, dedup and persist
//!
//! This module contains the per-page pipeline and its orchestration:
//! - Polite, budgeted HTTP fetching
//! - Fallback-chain extraction into [`CrawledPage`] records
//! - Run-scoped and store-backed deduplication
//! - Batch orchestration and run summaries

mod dates;
mod dedup;
mod extractor;
mod fetcher;
mod orchestrator;
mod service;
mod summary;

pub use dates::parse_date;
pub use dedup::{DedupGate, DedupVerdict};
pub use extractor::{
    extract_content, extract_date, extract_metadata, extract_page, extract_title, CrawledPage,
    MAX_METADATA_LINKS, MIN_CONTENT_CHARS, NO_CONTENT, UNTITLED,
};
pub use fetcher::{
    build_http_client, politeness_bounds, user_agent_string, FetchError, FetchErrorKind,
    FetchedPage, PageFetcher,
};
pub use orchestrator::CrawlOrchestrator;
pub use service::CrawlerService;
pub use summary::{PageOutcome, RunSummary, TargetOutcome};
