//! Standalone site definitions
//!
//! One definition per file in the sites directory, written as TOML or YAML.
//! A definition that cannot be parsed, or that has no start URL, is skipped
//! with a warning so one bad file never blocks the rest.

use crate::sites::rules::SelectorOverrides;
use crate::sites::target::{Category, CrawlTarget};
use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A site definition as written on disk
#[derive(Debug, Clone, Deserialize)]
pub struct SiteDefinition {
    pub id: String,
    pub name: String,
    /// Defaults to `name`
    pub region: Option<String>,
    #[serde(default)]
    pub category: Category,
    pub industry: Option<String>,
    #[serde(default)]
    pub start_urls: Vec<String>,
    #[serde(default)]
    pub selectors: SelectorOverrides,
}

impl SiteDefinition {
    /// Converts the definition into a depth-0 target
    ///
    /// Returns `None` when no usable start URL remains.
    pub fn into_target(self) -> Option<CrawlTarget> {
        let start_urls: Vec<String> = self
            .start_urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        if start_urls.is_empty() {
            return None;
        }

        Some(CrawlTarget {
            region: self.region.unwrap_or_else(|| self.name.clone()),
            id: self.id,
            name: self.name,
            industry: self.industry,
            depth: 0,
            start_urls,
            category: self.category,
            rules: self.selectors.into_rules(),
        })
    }
}

/// Parses one definition file, choosing the format by extension
pub fn parse_definition(path: &Path) -> ConfigResult<SiteDefinition> {
    let content = std::fs::read_to_string(path)?;
    match extension(path).as_deref() {
        Some("toml") => Ok(toml::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Err(ConfigError::Validation(format!(
            "unsupported site definition format: {}",
            path.display()
        ))),
    }
}

/// Loads every definition in `dir`, in sorted filename order
///
/// A missing directory contributes no targets.
pub fn load_definitions(dir: &Path) -> ConfigResult<Vec<CrawlTarget>> {
    if !dir.is_dir() {
        tracing::warn!("Sites directory not found at {}, no custom sites loaded", dir.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(extension(path).as_deref(), Some("toml" | "yaml" | "yml"))
        })
        .collect();
    files.sort();

    let mut targets = Vec::new();
    for path in files {
        let definition = match parse_definition(&path) {
            Ok(definition) => definition,
            Err(e) => {
                tracing::warn!("Skipping site definition {}: {}", path.display(), e);
                continue;
            }
        };

        let id = definition.id.clone();
        match definition.into_target() {
            Some(target) => targets.push(target),
            None => tracing::warn!(
                "Skipping site definition {} ({}): no start URL",
                id,
                path.display()
            ),
        }
    }

    tracing::info!("Loaded {} custom site definitions from {}", targets.len(), dir.display());
    Ok(targets)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
