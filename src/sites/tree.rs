//! Site tree flattening
//!
//! The tree document is JSON: either a single root node or an array of root
//! nodes. Every node with a non-empty `website` becomes one policy target.

use crate::sites::rules::ExtractionRules;
use crate::sites::target::{Category, CrawlTarget};
use crate::ConfigResult;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Deepest tree level that still produces targets
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// One node of the tree as written in the document
///
/// Children stay as raw JSON so a malformed child can be dropped on its own
/// without losing its siblings.
#[derive(Debug, Deserialize)]
struct TreeNode {
    id: Option<Value>,
    name: Option<String>,
    website: Option<String>,
    #[serde(default)]
    children: Vec<Value>,
}

/// Flattens a parsed tree document into targets, in pre-order
///
/// Nodes deeper than `max_depth` are omitted together with their subtrees.
/// A node that does not have the expected shape is dropped with a warning.
pub fn compile_tree(document: &Value, max_depth: u32) -> Vec<CrawlTarget> {
    let mut targets = Vec::new();

    match document {
        Value::Array(roots) => {
            for root in roots {
                walk(root, 0, max_depth, &mut targets);
            }
        }
        root => walk(root, 0, max_depth, &mut targets),
    }

    targets
}

/// Parses tree JSON text and flattens it
///
/// # Returns
///
/// * `Ok(Vec<CrawlTarget>)` - Targets in pre-order
/// * `Err(ConfigError::Json)` - The text is not valid JSON
pub fn parse_tree(content: &str, max_depth: u32) -> ConfigResult<Vec<CrawlTarget>> {
    let document: Value = serde_json::from_str(content)?;
    Ok(compile_tree(&document, max_depth))
}

/// Loads the tree document at `path`
///
/// A missing file contributes no targets; present but malformed JSON is a
/// configuration error.
pub fn load_tree(path: &Path, max_depth: u32) -> ConfigResult<Vec<CrawlTarget>> {
    if !path.exists() {
        tracing::warn!("Site tree not found at {}, no tree targets loaded", path.display());
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let targets = parse_tree(&content, max_depth)?;
    tracing::info!("Loaded {} targets from site tree {}", targets.len(), path.display());
    Ok(targets)
}

fn walk(value: &Value, depth: u32, max_depth: u32, targets: &mut Vec<CrawlTarget>) {
    if depth > max_depth {
        return;
    }

    let node: TreeNode = match serde_json::from_value(value.clone()) {
        Ok(node) => node,
        Err(e) => {
            tracing::warn!("Dropping malformed site tree node at depth {}: {}", depth, e);
            return;
        }
    };

    if let Some(website) = node.website.as_deref().map(str::trim) {
        if !website.is_empty() {
            let name = node.name.clone().unwrap_or_else(|| "Unknown".to_string());
            let id = node
                .id
                .as_ref()
                .and_then(node_id)
                .unwrap_or_else(|| format!("gov_{}", targets.len()));

            targets.push(CrawlTarget {
                id,
                region: name.clone(),
                name,
                industry: None,
                depth,
                start_urls: vec![website.to_string()],
                category: Category::Policy,
                rules: ExtractionRules::tree_defaults(),
            });
        }
    }

    for child in &node.children {
        walk(child, depth + 1, max_depth, targets);
    }
}

fn node_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
