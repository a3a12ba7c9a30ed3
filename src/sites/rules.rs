//! Extraction rule sets: ordered selector candidates per field

use serde::{Deserialize, Serialize};

/// Ordered CSS selector candidates for each extracted field
///
/// Candidates are tried in order and the first non-empty match wins; each
/// field falls back independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    pub title: Vec<String>,
    pub content: Vec<String>,
    pub date: Vec<String>,
}

impl ExtractionRules {
    /// Rules given to every target compiled from the site tree
    pub fn tree_defaults() -> Self {
        Self {
            title: strings(&["h1", ".title", "title"]),
            content: strings(&[".content", ".article", "main"]),
            date: strings(&[".date", ".publish-date", ".time"]),
        }
    }

    /// Rules used for any field a standalone site definition leaves unset
    pub fn extractor_defaults() -> Self {
        Self {
            title: strings(&["h1", "title", ".title", "#title"]),
            content: strings(&[
                ".content",
                ".article",
                ".post",
                "#content",
                "#article",
                ".news-content",
            ]),
            date: strings(&[".date", ".publish-date", ".pub-date", ".time", "#date"]),
        }
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::extractor_defaults()
    }
}

/// Per-field overrides from a site definition's `selectors` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SelectorOverrides {
    pub title: Option<Vec<String>>,
    pub content: Option<Vec<String>>,
    pub date: Option<Vec<String>>,
}

impl SelectorOverrides {
    /// Applies the overrides on top of the extractor defaults
    pub fn into_rules(self) -> ExtractionRules {
        let defaults = ExtractionRules::extractor_defaults();
        ExtractionRules {
            title: self.title.unwrap_or(defaults.title),
            content: self.content.unwrap_or(defaults.content),
            date: self.date.unwrap_or(defaults.date),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
