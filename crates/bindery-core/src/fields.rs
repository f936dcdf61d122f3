//! Field discovery: rank candidate paths inside one collection item for a
//! canonical field.
//!
//! The first element of the collection is the structural sample. Its object
//! members are walked with an explicit worklist; arrays are never entered, and
//! the walk stops descending at [`MAX_FIELD_DEPTH`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::{PathError, PathExpression};
use crate::resource::CanonicalField;

/// Maximum nesting depth (in object levels) the walk descends into.
pub const MAX_FIELD_DEPTH: usize = 8;

/// Maximum characters kept in a candidate's sample rendering.
pub const SAMPLE_MAX_CHARS: usize = 100;

pub const SCORE_EXACT: u32 = 100;
pub const SCORE_KEY_CONTAINS_FIELD: u32 = 90;
pub const SCORE_FIELD_CONTAINS_KEY: u32 = 80;
pub const SCORE_SYNONYM_BASE: u32 = 70;
pub const SCORE_PER_SYNONYM: u32 = 5;
pub const SCORE_NO_MATCH: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueType::String,
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Boolean,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
            Value::Null => ValueType::Null,
        }
    }
}

/// A path inside a collection item that may hold the target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCandidate {
    /// Relative to one collection item.
    pub path: PathExpression,
    pub value_type: ValueType,
    /// False iff the sampled value is null or an empty string.
    pub has_value: bool,
    /// Display rendering of the sampled value, truncated to
    /// [`SAMPLE_MAX_CHARS`] characters.
    pub sample: String,
    pub score: u32,
}

/// Result of one field discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiscovery {
    pub field: CanonicalField,
    /// All candidates, best first. Never truncated.
    pub candidates: Vec<FieldCandidate>,
    pub total: usize,
    /// True when the depth guard stopped the walk from entering deeper objects.
    pub depth_limited: bool,
}

impl FieldDiscovery {
    fn empty(field: CanonicalField) -> Self {
        Self {
            field,
            candidates: Vec::new(),
            total: 0,
            depth_limited: false,
        }
    }

    pub fn best(&self) -> Option<&FieldCandidate> {
        self.candidates.first()
    }
}

/// Relevance of a member key for a canonical field.
pub fn score_key(key: &str, field: CanonicalField) -> u32 {
    let key = key.to_lowercase();
    let target = field.as_str();

    if key == target {
        return SCORE_EXACT;
    }
    if key.contains(target) {
        return SCORE_KEY_CONTAINS_FIELD;
    }
    if !key.is_empty() && target.contains(key.as_str()) {
        return SCORE_FIELD_CONTAINS_KEY;
    }

    let hits = field
        .synonyms()
        .iter()
        .filter(|synonym| key.contains(*synonym))
        .count() as u32;
    if hits == 0 {
        SCORE_NO_MATCH
    } else {
        SCORE_SYNONYM_BASE + SCORE_PER_SYNONYM * hits
    }
}

/// Discover candidate paths for `field` within the collection at
/// `collection_path`.
///
/// Fails only when `collection_path` is malformed. A missing collection, an
/// empty one, or a first item that is not an object all yield an empty result;
/// callers should check the collection's item count first to tell an empty
/// collection apart from "no matching fields".
pub fn discover_fields(
    doc: &Value,
    collection_path: &str,
    field: CanonicalField,
) -> Result<FieldDiscovery, PathError> {
    let path = PathExpression::parse(collection_path)?;
    Ok(discover_fields_at(doc, &path, field))
}

/// Like [`discover_fields`] with an already parsed collection path.
pub fn discover_fields_at(
    doc: &Value,
    collection_path: &PathExpression,
    field: CanonicalField,
) -> FieldDiscovery {
    let Some(sample) = collection_path
        .resolve(doc)
        .ok()
        .and_then(Value::as_array)
        .and_then(|items| items.first())
    else {
        return FieldDiscovery::empty(field);
    };

    let (mut candidates, depth_limited) = walk(sample, field);
    // Stable: equal scores keep traversal order.
    candidates.sort_by(|a, b| b.score.cmp(&a.score));

    FieldDiscovery {
        field,
        total: candidates.len(),
        candidates,
        depth_limited,
    }
}

/// Run [`discover_fields`] for every canonical field.
pub fn discover_all_fields(
    doc: &Value,
    collection_path: &str,
) -> Result<BTreeMap<CanonicalField, FieldDiscovery>, PathError> {
    let path = PathExpression::parse(collection_path)?;
    Ok(CanonicalField::ALL
        .iter()
        .map(|field| (*field, discover_fields_at(doc, &path, *field)))
        .collect())
}

/// Pre-order walk over object members: each member is emitted, then (if it is
/// an object) its own members, before its next sibling.
fn walk(sample: &Value, field: CanonicalField) -> (Vec<FieldCandidate>, bool) {
    let mut candidates = Vec::new();
    let mut depth_limited = false;

    let Value::Object(root) = sample else {
        return (candidates, depth_limited);
    };

    // (path of the object being walked, its remaining members, member depth)
    let mut stack: Vec<(Option<PathExpression>, serde_json::map::Iter<'_>, usize)> =
        vec![(None, root.iter(), 1)];

    while let Some((prefix, members, depth)) = stack.last_mut() {
        let Some((key, value)) = members.next() else {
            stack.pop();
            continue;
        };
        let depth = *depth;
        let path = match prefix {
            None => PathExpression::key(key),
            Some(prefix) => prefix.child(key),
        };
        let Some(path) = path else {
            continue;
        };

        candidates.push(FieldCandidate {
            path: path.clone(),
            value_type: ValueType::of(value),
            has_value: has_value(value),
            sample: render_sample(value),
            score: score_key(key, field),
        });

        if let Value::Object(children) = value {
            if depth < MAX_FIELD_DEPTH {
                stack.push((Some(path), children.iter(), depth + 1));
            } else if !children.is_empty() {
                depth_limited = true;
            }
        }
    }

    (candidates, depth_limited)
}

fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn render_sample(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() <= SAMPLE_MAX_CHARS {
        return rendered;
    }
    let mut truncated: String = rendered.chars().take(SAMPLE_MAX_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(discovery: &FieldDiscovery) -> Vec<String> {
        discovery
            .candidates
            .iter()
            .map(|c| c.path.to_string())
            .collect()
    }

    #[test]
    fn test_exact_title_scores_100_and_beats_subtitle() {
        let doc = json!({"items": [{"subtitle": "Y", "title": "X"}]});
        let found = discover_fields(&doc, "items", CanonicalField::Title).unwrap();
        assert_eq!(paths(&found), vec!["title", "subtitle"]);
        assert_eq!(found.candidates[0].score, 100);
        assert_eq!(found.candidates[1].score, 90);
        assert!(found.candidates[0].score > found.candidates[1].score);
    }

    #[test]
    fn test_score_rules() {
        assert_eq!(score_key("TITLE", CanonicalField::Title), SCORE_EXACT);
        assert_eq!(score_key("book_title", CanonicalField::Title), SCORE_KEY_CONTAINS_FIELD);
        assert_eq!(score_key("author", CanonicalField::Authors), SCORE_FIELD_CONTAINS_KEY);
        assert_eq!(score_key("name", CanonicalField::Title), 75);
        assert_eq!(score_key("cover_url", CanonicalField::Thumbnail), 80);
        assert_eq!(score_key("publisher", CanonicalField::Title), SCORE_NO_MATCH);
        assert_eq!(score_key("", CanonicalField::Title), SCORE_NO_MATCH);
    }

    #[test]
    fn test_synonym_score_grows_with_every_hit() {
        assert_eq!(score_key("cover_image_photo_url", CanonicalField::Thumbnail), 90);
        assert_eq!(
            score_key("image_cover_photo_picture_link", CanonicalField::Thumbnail),
            95
        );
    }

    #[test]
    fn test_nested_objects_contribute_self_and_children_in_preorder() {
        let doc = json!({"items": [{
            "id": "abc",
            "volumeInfo": {
                "title": "Dune",
                "imageLinks": {"thumbnail": "http://img/1.jpg"}
            },
            "kind": "book"
        }]});
        let found = discover_fields(&doc, "items", CanonicalField::Isbn).unwrap();
        // No key scores above the synonym hit on "id", so the rest keep walk order.
        assert_eq!(
            paths(&found),
            vec![
                "id",
                "volumeInfo",
                "volumeInfo.title",
                "volumeInfo.imageLinks",
                "volumeInfo.imageLinks.thumbnail",
                "kind",
            ]
        );
        assert_eq!(found.total, 6);
        assert_eq!(found.candidates[1].value_type, ValueType::Object);
    }

    #[test]
    fn test_arrays_are_not_entered() {
        let doc = json!({"docs": [{
            "authors": [{"name": "Frank Herbert"}],
            "title": "Dune"
        }]});
        let found = discover_fields(&doc, "docs", CanonicalField::Authors).unwrap();
        assert_eq!(paths(&found), vec!["authors", "title"]);
        assert_eq!(found.candidates[0].value_type, ValueType::Array);
        assert_eq!(found.candidates[0].score, 100);
    }

    #[test]
    fn test_thumbnail_found_deep() {
        let doc = json!({"items": [{
            "volumeInfo": {"title": "Dune", "imageLinks": {"smallThumbnail": "s", "thumbnail": "t"}}
        }]});
        let found = discover_fields(&doc, "items", CanonicalField::Thumbnail).unwrap();
        let best = found.best().unwrap();
        assert_eq!(best.path.to_string(), "volumeInfo.imageLinks.thumbnail");
        assert_eq!(best.sample, "t");
        assert_eq!(found.candidates[1].path.to_string(), "volumeInfo.imageLinks.smallThumbnail");
    }

    #[test]
    fn test_has_value_semantics() {
        let doc = json!({"items": [{"a": null, "b": "", "c": 0, "d": false, "e": [], "f": "x"}]});
        let found = discover_fields(&doc, "items", CanonicalField::Title).unwrap();
        let by_path = |p: &str| {
            found
                .candidates
                .iter()
                .find(|c| c.path.to_string() == p)
                .unwrap()
                .clone()
        };
        assert!(!by_path("a").has_value);
        assert_eq!(by_path("a").value_type, ValueType::Null);
        assert!(!by_path("b").has_value);
        assert!(by_path("c").has_value);
        assert!(by_path("d").has_value);
        assert!(by_path("e").has_value);
        assert!(by_path("f").has_value);
    }

    #[test]
    fn test_sample_truncated() {
        let long = "x".repeat(250);
        let doc = json!({"items": [{"description": long}]});
        let found = discover_fields(&doc, "items", CanonicalField::Subject).unwrap();
        let sample = &found.candidates[0].sample;
        assert_eq!(sample.chars().count(), SAMPLE_MAX_CHARS + 3);
        assert!(sample.ends_with("..."));
    }

    #[test]
    fn test_empty_or_missing_collection_yields_nothing() {
        let doc = json!({"items": [], "meta": {"count": 0}, "list": ["a", "b"]});
        for path in ["items", "missing", "meta", "list"] {
            let found = discover_fields(&doc, path, CanonicalField::Title).unwrap();
            assert!(found.candidates.is_empty(), "{path}");
            assert_eq!(found.total, 0);
        }
    }

    #[test]
    fn test_malformed_collection_path_is_error() {
        let doc = json!({"items": [{"title": "x"}]});
        assert!(discover_fields(&doc, "items[", CanonicalField::Title).is_err());
    }

    #[test]
    fn test_depth_guard() {
        let mut item = json!({"title": "leaf"});
        for i in (0..12).rev() {
            item = json!({format!("level{i}"): item});
        }
        let doc = json!({"items": [item]});
        let found = discover_fields(&doc, "items", CanonicalField::Title).unwrap();
        assert!(found.depth_limited);
        assert_eq!(found.total, MAX_FIELD_DEPTH);
        assert!(found.candidates.iter().all(|c| c.path.len() <= MAX_FIELD_DEPTH));
    }

    #[test]
    fn test_uses_first_item_only() {
        let doc = json!({"items": [{"title": "A"}, {"name": "B", "isbn": "1"}]});
        let found = discover_fields(&doc, "items", CanonicalField::Isbn).unwrap();
        assert_eq!(paths(&found), vec!["title"]);
    }

    #[test]
    fn test_deterministic_across_calls() {
        let doc = json!({"data": {"books": [{
            "name": "n", "label": "l", "headline": "h", "meta": {"title_sort": "t"}
        }]}});
        let first = discover_fields(&doc, "data.books", CanonicalField::Title).unwrap();
        for _ in 0..5 {
            assert_eq!(
                discover_fields(&doc, "data.books", CanonicalField::Title).unwrap(),
                first
            );
        }
        assert_eq!(
            paths(&first),
            vec!["meta.title_sort", "name", "label", "headline", "meta"]
        );
    }

    #[test]
    fn test_discover_all_fields() {
        let doc = json!({"items": [{"title": "Dune", "author": "Herbert", "isbn13": "978"}]});
        let all = discover_all_fields(&doc, "items").unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(
            all[&CanonicalField::Authors].best().unwrap().path.to_string(),
            "author"
        );
        assert_eq!(
            all[&CanonicalField::Isbn].best().unwrap().path.to_string(),
            "isbn13"
        );
    }
}
