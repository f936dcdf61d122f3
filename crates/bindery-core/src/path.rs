//! Dot/bracket path expressions over JSON documents.
//!
//! Grammar: `identifier(.identifier|[index])*`, where identifiers match
//! `[A-Za-z0-9_]+` and indices are decimal integers. Examples:
//!
//! ```text
//! items
//! items[0].volumeInfo.title
//! data.records[2]
//! ```
//!
//! Formatting a parsed expression yields text that parses back to the same
//! expression.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One step of a [`PathExpression`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object member lookup.
    Key(String),
    /// Array element lookup.
    Index(usize),
}

/// A parsed path expression.
///
/// Serialized as its text form so it can travel through JSON APIs as a plain
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathExpression {
    segments: Vec<Segment>,
}

/// Malformed path text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path expression is empty")]
    Empty,

    #[error("Unexpected character '{found}' at position {position} in path")]
    UnexpectedChar { found: char, position: usize },

    #[error("Expected an identifier at position {position} in path")]
    MissingIdentifier { position: usize },

    #[error("Unterminated index starting at position {position} in path")]
    UnterminatedIndex { position: usize },

    #[error("Invalid index '{raw}' at position {position} in path")]
    InvalidIndex { raw: String, position: usize },
}

/// A path that does not resolve against a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Path segment {position} ({segment}) not found")]
pub struct NotFound {
    /// Zero-based index of the first segment that failed.
    pub position: usize,
    /// Text form of the failing segment.
    pub segment: String,
}

/// Returns true if `key` is addressable as a single identifier segment.
pub fn is_identifier(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(is_identifier_byte)
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl PathExpression {
    /// Parse path text. See the module docs for the grammar.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if text.is_empty() {
            return Err(PathError::Empty);
        }

        let bytes = text.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;

        let first = read_identifier(text, pos);
        if first.is_empty() {
            return Err(unexpected(text, pos));
        }
        pos += first.len();
        segments.push(Segment::Key(first.to_string()));

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    let ident = read_identifier(text, pos + 1);
                    if ident.is_empty() {
                        return Err(PathError::MissingIdentifier { position: pos + 1 });
                    }
                    pos += 1 + ident.len();
                    segments.push(Segment::Key(ident.to_string()));
                }
                b'[' => {
                    let start = pos;
                    let close = text[start + 1..]
                        .find(']')
                        .map(|offset| start + 1 + offset)
                        .ok_or(PathError::UnterminatedIndex { position: start })?;
                    let raw = &text[start + 1..close];
                    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(PathError::InvalidIndex {
                            raw: raw.to_string(),
                            position: start + 1,
                        });
                    }
                    let index = raw.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                        raw: raw.to_string(),
                        position: start + 1,
                    })?;
                    segments.push(Segment::Index(index));
                    pos = close + 1;
                }
                _ => return Err(unexpected(text, pos)),
            }
        }

        Ok(Self { segments })
    }

    /// Single-key path. Returns `None` if `key` is not an identifier.
    pub fn key(key: &str) -> Option<Self> {
        is_identifier(key).then(|| Self {
            segments: vec![Segment::Key(key.to_string())],
        })
    }

    /// Extend this path with an object key. Returns `None` if `key` is not an
    /// identifier.
    pub fn child(&self, key: &str) -> Option<Self> {
        if !is_identifier(key) {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Some(Self { segments })
    }

    /// Extend this path with an array index.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    /// Concatenate two paths.
    pub fn join(&self, other: &PathExpression) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments (always at least one).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last object key in the path, if any.
    pub fn last_key(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            Segment::Key(k) => Some(k.as_str()),
            Segment::Index(_) => None,
        })
    }

    /// Resolve against a document. Never panics.
    pub fn resolve<'a>(&self, doc: &'a Value) -> Result<&'a Value, NotFound> {
        let mut current = doc;
        for (position, segment) in self.segments.iter().enumerate() {
            let next = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            };
            current = next.ok_or_else(|| NotFound {
                position,
                segment: segment.to_string(),
            })?;
        }
        Ok(current)
    }
}

/// Parse and resolve in one step.
///
/// Fails only on malformed path text; an unresolvable path is `Ok(None)`.
pub fn resolve_str<'a>(doc: &'a Value, text: &str) -> Result<Option<&'a Value>, PathError> {
    let path = PathExpression::parse(text)?;
    Ok(path.resolve(doc).ok())
}

fn read_identifier(text: &str, start: usize) -> &str {
    let rest = text.get(start..).unwrap_or("");
    let len = rest
        .bytes()
        .take_while(|b| is_identifier_byte(*b))
        .count();
    &rest[..len]
}

fn unexpected(text: &str, position: usize) -> PathError {
    match text.get(position..).and_then(|rest| rest.chars().next()) {
        Some(found) => PathError::UnexpectedChar { found, position },
        None => PathError::MissingIdentifier { position },
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for PathExpression {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathExpression {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathExpression> for String {
    fn from(path: PathExpression) -> Self {
        path.to_string()
    }
}
