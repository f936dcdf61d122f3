//! Structural and cross-field validation of [`ResourceConfig`].
//!
//! Validation is report-all: a single call walks the whole config and returns
//! every violation. Error paths use the serialized field names and `[i]`
//! indices, e.g. `endpoints[1].field_map.title` or `rate_limit.burst_limit`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::path::PathExpression;
use crate::resource::{AuthSpec, CanonicalField, EndpointSpec, KeyValue, ResourceConfig};

pub const MIN_TIMEOUT_SECONDS: i64 = 1;
pub const MAX_TIMEOUT_SECONDS: i64 = 300;
pub const MAX_RETRY_ATTEMPTS: i64 = 10;
pub const MAX_ENDPOINTS: usize = 10;

/// One constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field path in data-model addressing.
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every violation found in one validation pass. Never empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Resource config has {} validation error(s)", .0.len())]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Errors reported at exactly `path`.
    pub fn at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.0.iter().filter(move |e| e.path == path)
    }

    pub fn has(&self, path: &str) -> bool {
        self.at(path).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Default)]
struct Report {
    errors: Vec<ValidationError>,
}

impl Report {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn require_non_empty(&mut self, path: impl Into<String>, value: &str) {
        if value.trim().is_empty() {
            self.push(path, "must not be empty");
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

/// Validate a resource config, reporting every violation.
pub fn validate(config: &ResourceConfig) -> Result<(), ValidationErrors> {
    let mut report = Report::default();

    validate_base_url(&config.base_url, &mut report);
    report.require_non_empty("default_endpoint", &config.default_endpoint);

    if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&config.timeout_seconds) {
        report.push(
            "timeout_seconds",
            format!("must be between {MIN_TIMEOUT_SECONDS} and {MAX_TIMEOUT_SECONDS}"),
        );
    }
    if !(0..=MAX_RETRY_ATTEMPTS).contains(&config.retry_attempts) {
        report.push(
            "retry_attempts",
            format!("must be between 0 and {MAX_RETRY_ATTEMPTS}"),
        );
    }
    if config.rate_limit.requests_per_minute < 0 {
        report.push("rate_limit.requests_per_minute", "must not be negative");
    }
    if config.rate_limit.burst_limit < 0 {
        report.push("rate_limit.burst_limit", "must not be negative");
    } else if config.rate_limit.burst_limit > config.rate_limit.requests_per_minute {
        report.push(
            "rate_limit.burst_limit",
            format!(
                "must not exceed requests_per_minute ({})",
                config.rate_limit.requests_per_minute
            ),
        );
    }

    validate_auth(&config.auth, &mut report);
    validate_key_values(&config.headers, "headers", false, &mut report);
    validate_endpoints(&config.endpoints, &mut report);

    report.finish()
}

fn validate_base_url(base_url: &str, report: &mut Report) {
    if base_url.trim().is_empty() {
        report.push("base_url", "must not be empty");
        return;
    }
    match Url::parse(base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => report.push(
            "base_url",
            format!("must be an http(s) URL with a host, got scheme '{}'", url.scheme()),
        ),
        Err(e) => report.push("base_url", format!("is not a valid URL: {e}")),
    }
}

fn validate_auth(auth: &AuthSpec, report: &mut Report) {
    match auth {
        AuthSpec::None => {}
        AuthSpec::ApiKey { name, value, .. } => {
            report.require_non_empty("auth.name", name);
            report.require_non_empty("auth.value", value);
        }
        AuthSpec::Bearer { token } => report.require_non_empty("auth.token", token),
        AuthSpec::Basic { username, password } => {
            report.require_non_empty("auth.username", username);
            report.require_non_empty("auth.password", password);
        }
    }
}

/// Keys must be non-empty and unique; header names compare case-insensitively.
fn validate_key_values(items: &[KeyValue], prefix: &str, case_sensitive: bool, report: &mut Report) {
    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let path = format!("{prefix}[{i}].key");
        if item.key.trim().is_empty() {
            report.push(path, "must not be empty");
            continue;
        }
        let normalized = if case_sensitive {
            item.key.clone()
        } else {
            item.key.to_ascii_lowercase()
        };
        if !seen.insert(normalized) {
            report.push(path, format!("duplicate key '{}'", item.key));
        }
    }
}

fn validate_endpoints(endpoints: &[EndpointSpec], report: &mut Report) {
    if endpoints.is_empty() {
        report.push("endpoints", "at least one endpoint is required");
    } else if endpoints.len() > MAX_ENDPOINTS {
        report.push(
            "endpoints",
            format!("at most {MAX_ENDPOINTS} endpoints are allowed, got {}", endpoints.len()),
        );
    }

    let mut paths = HashSet::new();
    for (i, endpoint) in endpoints.iter().enumerate() {
        let prefix = format!("endpoints[{i}]");
        report.require_non_empty(format!("{prefix}.label"), &endpoint.label);

        if endpoint.path.trim().is_empty() {
            report.push(format!("{prefix}.path"), "must not be empty");
        } else {
            if !endpoint.path.starts_with('/') {
                report.push(format!("{prefix}.path"), "must start with '/'");
            }
            if !paths.insert(endpoint.path.as_str()) {
                report.push(
                    format!("{prefix}.path"),
                    format!("duplicate endpoint path '{}'", endpoint.path),
                );
            }
        }

        validate_path_text(
            &format!("{prefix}.collection_path"),
            &endpoint.collection_path,
            true,
            report,
        );
        validate_key_values(
            &endpoint.query_params,
            &format!("{prefix}.query_params"),
            true,
            report,
        );
        validate_field_map(endpoint, &prefix, report);

        if let Some(pagination) = &endpoint.pagination {
            let pprefix = format!("{prefix}.pagination");
            report.require_non_empty(format!("{pprefix}.page_key"), &pagination.page_key);
            report.require_non_empty(format!("{pprefix}.per_page_key"), &pagination.per_page_key);
            if pagination.default_per_page == 0 {
                report.push(format!("{pprefix}.default_per_page"), "must be at least 1");
            } else if pagination.default_per_page > pagination.max_per_page {
                report.push(
                    format!("{pprefix}.default_per_page"),
                    format!("must not exceed max_per_page ({})", pagination.max_per_page),
                );
            }
        }
    }
}

fn validate_field_map(endpoint: &EndpointSpec, prefix: &str, report: &mut Report) {
    let map_path = format!("{prefix}.field_map");

    let missing: Vec<&str> = CanonicalField::ALL
        .iter()
        .map(CanonicalField::as_str)
        .filter(|name| !endpoint.field_map.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        report.push(
            map_path.clone(),
            format!("missing canonical field(s): {}", missing.join(", ")),
        );
    }

    for (key, value) in &endpoint.field_map {
        let entry_path = format!("{map_path}.{key}");
        match key.parse::<CanonicalField>() {
            Ok(field) if field.as_str() == key => {
                validate_path_text(&entry_path, value, field.is_required(), report);
            }
            _ => report.push(entry_path, format!("'{key}' is not a canonical field")),
        }
    }
}

fn validate_path_text(path: &str, text: &str, required: bool, report: &mut Report) {
    if text.trim().is_empty() {
        if required {
            report.push(path, "must not be empty");
        }
        return;
    }
    if let Err(e) = PathExpression::parse(text) {
        report.push(path, format!("invalid path expression: {e}"));
    }
}
