//! Typed representation of a resource-to-API mapping.
//!
//! Operator-entered values (paths, field-map entries, header and query lists)
//! are kept as plain strings here so that [`crate::validate::validate`] can
//! report every problem at once instead of stopping at the first value that
//! fails to deserialize.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The six target attributes of the canonical book-catalog schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalField {
    Title,
    Authors,
    Subject,
    Isbn,
    Issn,
    Thumbnail,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::Title,
        CanonicalField::Authors,
        CanonicalField::Subject,
        CanonicalField::Isbn,
        CanonicalField::Issn,
        CanonicalField::Thumbnail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Title => "title",
            CanonicalField::Authors => "authors",
            CanonicalField::Subject => "subject",
            CanonicalField::Isbn => "isbn",
            CanonicalField::Issn => "issn",
            CanonicalField::Thumbnail => "thumbnail",
        }
    }

    /// Key names that suggest this field in a third-party payload.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Title => &["title", "name", "headline", "subject", "label"],
            CanonicalField::Authors => &[
                "author",
                "authors",
                "writer",
                "writers",
                "creator",
                "creators",
                "contributor",
            ],
            CanonicalField::Subject => &[
                "subject",
                "category",
                "genre",
                "topic",
                "tags",
                "classification",
            ],
            CanonicalField::Isbn => &["isbn", "identifier", "book_id", "id"],
            CanonicalField::Issn => &["issn", "serial_id", "serial"],
            CanonicalField::Thumbnail => &[
                "thumbnail", "image", "cover", "photo", "picture", "url", "link", "src",
            ],
        }
    }

    /// Only `title` must be mapped for an endpoint to be usable.
    pub fn is_required(&self) -> bool {
        matches!(self, CanonicalField::Title)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(CanonicalField::Title),
            "authors" => Ok(CanonicalField::Authors),
            "subject" => Ok(CanonicalField::Subject),
            "isbn" => Ok(CanonicalField::Isbn),
            "issn" => Ok(CanonicalField::Issn),
            "thumbnail" => Ok(CanonicalField::Thumbnail),
            _ => Err(format!("Unknown canonical field: {s}")),
        }
    }
}

/// Where an API key is injected into the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Credentials attached to every request made for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSpec {
    #[default]
    None,
    ApiKey {
        name: String,
        value: String,
        #[serde(default)]
        location: ApiKeyLocation,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

impl AuthSpec {
    pub fn api_key_header(name: impl Into<String>, value: impl Into<String>) -> Self {
        AuthSpec::ApiKey {
            name: name.into(),
            value: value.into(),
            location: ApiKeyLocation::Header,
        }
    }

    pub fn api_key_query(name: impl Into<String>, value: impl Into<String>) -> Self {
        AuthSpec::ApiKey {
            name: name.into(),
            value: value.into(),
            location: ApiKeyLocation::Query,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        AuthSpec::Bearer {
            token: token.into(),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthSpec::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthSpec::None => "none",
            AuthSpec::ApiKey { .. } => "api_key",
            AuthSpec::Bearer { .. } => "bearer",
            AuthSpec::Basic { .. } => "basic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_minute: i64,
    pub burst_limit: i64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationKind {
    Offset,
    Page,
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSpec {
    #[serde(rename = "type")]
    pub kind: PaginationKind,
    pub page_key: String,
    pub per_page_key: String,
    pub default_per_page: u32,
    pub max_per_page: u32,
}

/// HTTP method for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    #[default]
    Active,
    Inactive,
}

/// Last sync outcome stored alongside an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSyncStatus {
    #[default]
    Idle,
    Failed,
    Completed,
}

/// A key/value pair in an ordered list (headers, query parameters).
///
/// Lists rather than maps so duplicates survive deserialization and can be
/// reported by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Canonical field name → path into one collection item.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub label: String,
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub collection_path: String,
    #[serde(default)]
    pub query_params: Vec<KeyValue>,
    #[serde(default)]
    pub field_map: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSpec>,
    #[serde(default)]
    pub status: EndpointStatus,
    #[serde(default)]
    pub sync_status: EndpointSyncStatus,
}

impl EndpointSpec {
    /// Endpoint with every canonical field present but unmapped.
    pub fn new(
        label: impl Into<String>,
        path: impl Into<String>,
        collection_path: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            method: HttpMethod::Get,
            collection_path: collection_path.into(),
            query_params: Vec::new(),
            field_map: empty_field_map(),
            pagination: None,
            status: EndpointStatus::Active,
            sync_status: EndpointSyncStatus::Idle,
        }
    }

    pub fn with_field(mut self, field: CanonicalField, path: impl Into<String>) -> Self {
        self.field_map.insert(field.as_str().to_string(), path.into());
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push(KeyValue::new(key, value));
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationSpec) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// The mapped path for a field, if present and non-empty.
    pub fn field_path(&self, field: CanonicalField) -> Option<&str> {
        self.field_map
            .get(field.as_str())
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// A field map containing all six canonical keys with empty paths.
pub fn empty_field_map() -> FieldMap {
    CanonicalField::ALL
        .iter()
        .map(|f| (f.as_str().to_string(), String::new()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub base_url: String,
    pub default_endpoint: String,
    #[serde(default)]
    pub auth: AuthSpec,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: i64,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

fn default_timeout_seconds() -> i64 {
    30
}

fn default_retry_attempts() -> i64 {
    3
}

impl ResourceConfig {
    pub fn new(base_url: impl Into<String>, default_endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_endpoint: default_endpoint.into(),
            auth: AuthSpec::None,
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            rate_limit: RateLimit::default(),
            headers: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_auth(mut self, auth: AuthSpec) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(KeyValue::new(key, value));
        self
    }

    pub fn with_endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: i64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Load a config from a JSON file.
    ///
    /// Only checks that the file is well-formed JSON of the right shape; call
    /// [`crate::validate::validate`] for the constraint checks.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read resource config {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid resource config {}: {e}",
                path.display()
            ))
        })
    }

    /// Look up an endpoint by its exact path.
    pub fn endpoint(&self, path: &str) -> Option<&EndpointSpec> {
        self.endpoints.iter().find(|e| e.path == path)
    }

    /// The endpoint named by `default_endpoint`, falling back to the first one.
    pub fn default_endpoint_spec(&self) -> Option<&EndpointSpec> {
        self.endpoint(&self.default_endpoint)
            .or_else(|| self.endpoints.first())
    }
}
