//! HTML extraction into normalized page records
//!
//! Every field is filled through its own fallback chain: selector candidates
//! are tried in order and the first usable match wins, so a page may take its
//! title from the first candidate and its body from the third. Extraction
//! never fails; the worst case is a page made of sentinels and the fetch
//! timestamp.

use crate::crawler::dates::parse_date;
use crate::sites::{CrawlTarget, ExtractionRules};
use crate::state::PageStatus;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Title used when neither a selector nor `<title>` yields text
pub const UNTITLED: &str = "Untitled";

/// Body used when the document has no body text at all
pub const NO_CONTENT: &str = "(no content)";

/// A content match must be longer than this many characters to be accepted
pub const MIN_CONTENT_CHARS: usize = 100;

/// Maximum number of outbound links kept in metadata
pub const MAX_METADATA_LINKS: usize = 10;

static KEYWORD_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)keyword").unwrap());

/// A normalized page, keyed globally by `url`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Display name of the site the page came from
    pub source: String,
    pub region: String,
    pub industry: Option<String>,
    /// Best effort; the fetch time when no date could be parsed
    pub publish_date: DateTime<Utc>,
    pub crawl_date: DateTime<Utc>,
    pub metadata: Map<String, Value>,
    pub status: PageStatus,
    pub retry_count: u32,
}

/// Extracts a page record from fetched HTML
///
/// # Arguments
///
/// * `html` - The decoded response body
/// * `url` - The URL the body was fetched from
/// * `target` - Supplies the extraction rules and the source labels
/// * `fetched_at` - Fetch timestamp, also the publish date of last resort
///
/// # Example
///
/// ```no_run
/// use policy_pulse::crawler::extract_page;
/// # fn example(target: &policy_pulse::CrawlTarget) {
/// let html = r#"<html><head><title>通知</title></head><body><p>正文</p></body></html>"#;
/// let page = extract_page(html, "https://www.gov.cn/a", target, chrono::Utc::now());
/// assert_eq!(page.title, "通知");
/// # }
/// ```
pub fn extract_page(
    html: &str,
    url: &str,
    target: &CrawlTarget,
    fetched_at: DateTime<Utc>,
) -> CrawledPage {
    let document = Html::parse_document(html);
    let rules = &target.rules;

    CrawledPage {
        url: url.to_string(),
        title: extract_title(&document, rules),
        content: extract_content(&document, rules),
        source: target.name.clone(),
        region: target.region.clone(),
        industry: target.industry.clone(),
        publish_date: extract_date(&document, rules).unwrap_or(fetched_at),
        crawl_date: fetched_at,
        metadata: extract_metadata(&document),
        status: PageStatus::Pending,
        retry_count: 0,
    }
}

/// First non-empty title candidate, then `<title>`, then [`UNTITLED`]
pub fn extract_title(document: &Html, rules: &ExtractionRules) -> String {
    rules
        .title
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("title"))
        .filter_map(parse_selector)
        .find_map(|selector| {
            document
                .select(&selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Content from the first candidate whose joined text is long enough
///
/// Script and style text is never included. Falls back to the whole body,
/// and to [`NO_CONTENT`] when the body has no text.
pub fn extract_content(document: &Html, rules: &ExtractionRules) -> String {
    for selector in rules.content.iter().filter_map(|c| parse_selector(c)) {
        let texts: Vec<String> = document
            .select(&selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();

        if texts.is_empty() {
            continue;
        }

        let content = texts.join(" ");
        if content.chars().count() > MIN_CONTENT_CHARS {
            return content;
        }
    }

    body_text(document).unwrap_or_else(|| NO_CONTENT.to_string())
}

/// The first parseable date from the date candidates or the date meta tags
pub fn extract_date(document: &Html, rules: &ExtractionRules) -> Option<DateTime<Utc>> {
    let from_selectors = rules
        .date
        .iter()
        .filter_map(|candidate| parse_selector(candidate))
        .find_map(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| parse_date(&element_text(element)))
        });

    from_selectors.or_else(|| {
        ["meta[name=\"date\"]", "meta[property=\"article:published_time\"]"]
            .iter()
            .filter_map(|candidate| parse_selector(candidate))
            .find_map(|selector| {
                document
                    .select(&selector)
                    .next()
                    .and_then(|meta| meta.value().attr("content"))
                    .and_then(parse_date)
            })
    })
}

/// Meta pairs, keyword-class texts and a capped list of outbound links
pub fn extract_metadata(document: &Html) -> Map<String, Value> {
    let mut metadata = Map::new();

    if let Some(selector) = parse_selector("meta") {
        for meta in document.select(&selector) {
            let element = meta.value();
            let key = element.attr("name").or_else(|| element.attr("property"));
            if let (Some(key), Some(content)) = (key, element.attr("content")) {
                if !key.is_empty() && !content.is_empty() {
                    metadata.insert(key.to_string(), Value::String(content.to_string()));
                }
            }
        }
    }

    if let Some(selector) = parse_selector("[class]") {
        let keywords: Vec<Value> = document
            .select(&selector)
            .filter(|element| element.value().classes().any(|c| KEYWORD_CLASS.is_match(c)))
            .map(|element| Value::String(element_text(element)))
            .collect();

        if !keywords.is_empty() {
            metadata.insert("keywords".to_string(), Value::Array(keywords));
        }
    }

    if let Some(selector) = parse_selector("a[href]") {
        let links: Vec<Value> = document
            .select(&selector)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?;
                if href.starts_with("http") || href.starts_with('/') {
                    Some(json!({ "url": href, "text": element_text(anchor) }))
                } else {
                    None
                }
            })
            .take(MAX_METADATA_LINKS)
            .collect();

        if !links.is_empty() {
            metadata.insert("links".to_string(), Value::Array(links));
        }
    }

    metadata
}

/// Parses a selector, skipping candidates that are not valid CSS
fn parse_selector(candidate: &str) -> Option<Selector> {
    match Selector::parse(candidate) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::debug!("Skipping invalid selector '{}': {:?}", candidate, e);
            None
        }
    }
}

fn body_text(document: &Html) -> Option<String> {
    let selector = parse_selector("body")?;
    document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Trimmed text nodes of an element joined by spaces, without script/style
fn element_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    collect_text(element, &mut parts);
    parts.join(" ")
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Node::Element(el) if matches!(el.name(), "script" | "style") => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, parts);
                }
            }
            _ => {}
        }
    }
}
