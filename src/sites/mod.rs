//! Site catalog compilation
//!
//! Turns the region/organization tree and the standalone site definitions
//! into one flat, ordered list of [`CrawlTarget`]s. The list is built once at
//! startup and never changes for the life of the process.

mod definition;
mod rules;
mod target;
mod tree;

pub use definition::{load_definitions, parse_definition, SiteDefinition};
pub use rules::{ExtractionRules, SelectorOverrides};
pub use target::{Category, CrawlTarget};
pub use tree::{compile_tree, load_tree, parse_tree, DEFAULT_MAX_DEPTH};

use crate::config::{CrawlerConfig, SitesConfig};
use crate::ConfigResult;
use std::path::Path;

/// Compiles all configured targets: tree targets first, then definitions
///
/// # Arguments
///
/// * `sites` - Where the tree and the definitions directory live
/// * `crawler` - Supplies the maximum tree depth
///
/// # Returns
///
/// * `Ok(Vec<CrawlTarget>)` - Targets in deterministic order
/// * `Err(ConfigError)` - The tree document exists but is malformed
pub fn compile_targets(sites: &SitesConfig, crawler: &CrawlerConfig) -> ConfigResult<Vec<CrawlTarget>> {
    let mut targets = Vec::new();

    if let Some(tree_path) = &sites.tree_path {
        targets.extend(load_tree(Path::new(tree_path), crawler.max_depth)?);
    }

    if let Some(sites_dir) = &sites.sites_dir {
        targets.extend(load_definitions(Path::new(sites_dir))?);
    }

    tracing::info!("Compiled {} crawl targets", targets.len());
    Ok(targets)
}
