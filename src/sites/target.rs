//! Compiled crawl targets

use crate::sites::rules::ExtractionRules;
use crate::storage::Collection;
use serde::{Deserialize, Serialize};

/// What a site publishes; decides which raw collection its pages land in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Policy,
    Bid,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Bid => "bid",
        }
    }

    /// Raw collection that stores pages of this category
    pub fn collection(&self) -> Collection {
        match self {
            Self::Policy => Collection::RawPages,
            Self::Bid => Collection::RawBids,
        }
    }
}

/// An immutable description of one site to fetch, with its extraction rules
///
/// Produced only by the site compiler, which guarantees `start_urls` is
/// non-empty and `depth` is within the configured maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub id: String,
    pub name: String,
    pub region: String,
    pub industry: Option<String>,
    pub depth: u32,
    pub start_urls: Vec<String>,
    pub category: Category,
    pub rules: ExtractionRules,
}
