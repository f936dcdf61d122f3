//! Collection discovery: find the array in an API response that holds one
//! record per catalog item.
//!
//! Only top-level members and the immediate children of top-level objects are
//! inspected. Anything deeper is ignored, which bounds the cost of discovery on
//! adversarial documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::PathExpression;

/// Member names that conventionally hold the record list.
pub const COLLECTION_ALLOW_LIST: [&str; 15] = [
    "items",
    "data",
    "results",
    "records",
    "list",
    "collection",
    "articles",
    "books",
    "documents",
    "entries",
    "objects",
    "content",
    "resources",
    "assets",
    "entities",
];

/// Number of sample items kept per candidate.
pub const MAX_SAMPLE_ITEMS: usize = 2;

/// An array-valued member that may be the record collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCandidate {
    pub path: PathExpression,
    pub item_count: usize,
    pub sample_items: Vec<Value>,
    /// True for `key.nestedKey` candidates found one level down.
    pub is_nested: bool,
}

impl CollectionCandidate {
    fn new(path: PathExpression, items: &[Value], is_nested: bool) -> Self {
        Self {
            path,
            item_count: items.len(),
            sample_items: items.iter().take(MAX_SAMPLE_ITEMS).cloned().collect(),
            is_nested,
        }
    }

    /// Whether the candidate's member name is a conventional collection name.
    pub fn is_allow_listed(&self) -> bool {
        self.path.last_key().is_some_and(is_allow_listed)
    }
}

fn is_allow_listed(key: &str) -> bool {
    COLLECTION_ALLOW_LIST
        .iter()
        .any(|name| name.eq_ignore_ascii_case(key))
}

/// Discover and rank collection candidates in a sampled document.
///
/// Ranking is stable: allow-listed names first in document order, then the
/// rest by item count, largest first. A document without arrays at depth 0 or 1
/// (including a non-object root) yields an empty list.
pub fn discover_collections(doc: &Value) -> Vec<CollectionCandidate> {
    let Some(root) = doc.as_object() else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for (key, value) in root {
        let Some(path) = PathExpression::key(key) else {
            tracing::debug!(%key, "Skipping member that is not a path identifier");
            continue;
        };

        match value {
            Value::Array(items) => {
                candidates.push(CollectionCandidate::new(path, items, false));
            }
            Value::Object(children) => {
                for (child_key, child) in children {
                    let Value::Array(items) = child else {
                        continue;
                    };
                    match path.child(child_key) {
                        Some(child_path) => {
                            candidates.push(CollectionCandidate::new(child_path, items, true));
                        }
                        None => {
                            tracing::debug!(key = %child_key, "Skipping nested member that is not a path identifier");
                        }
                    }
                }
            }
            _ => {}
        }
    }

    rank(&mut candidates);
    candidates
}

fn rank(candidates: &mut [CollectionCandidate]) {
    // sort_by is stable, so discovery order survives among allow-listed names
    // and among equal item counts.
    candidates.sort_by(|a, b| match (a.is_allow_listed(), b.is_allow_listed()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        (false, false) => b.item_count.cmp(&a.item_count),
    });
}
