//! Endpoint probe: one bounded test request against a candidate endpoint.
//!
//! [`ProbeRequest::build`] turns config values into a concrete request
//! (URL with query, merged headers, auth injection). A [`Prober`]
//! implementation performs it with `timeout_seconds` as a hard deadline. Probes
//! never retry and have no side effects.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::resource::{ApiKeyLocation, AuthSpec, EndpointSpec, HttpMethod, KeyValue, ResourceConfig};

/// A fully resolved probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// Basic credentials, applied by the transport.
    pub basic_auth: Option<(String, String)>,
    pub timeout: Duration,
}

impl ProbeRequest {
    /// Build the concrete request for `endpoint` under `base_url`.
    ///
    /// Static headers come first; auth headers replace any static header of
    /// the same name (case-insensitive). Endpoint query parameters are appended
    /// after any query already present in the joined URL, followed by a
    /// query-located API key.
    pub fn build(
        base_url: &str,
        endpoint: &EndpointSpec,
        auth: &AuthSpec,
        headers: &[KeyValue],
        timeout_seconds: i64,
    ) -> Result<Self, ProbeError> {
        let mut url = join_url(base_url, &endpoint.path)?;

        let mut query: Vec<(String, String)> = endpoint
            .query_params
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect();

        let mut merged: Vec<(String, String)> = headers
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect();

        let mut basic_auth = None;
        match auth {
            AuthSpec::None => {}
            AuthSpec::ApiKey {
                name,
                value,
                location: ApiKeyLocation::Header,
            } => set_header(&mut merged, name, value),
            AuthSpec::ApiKey {
                name,
                value,
                location: ApiKeyLocation::Query,
            } => query.push((name.clone(), value.clone())),
            AuthSpec::Bearer { token } => {
                set_header(&mut merged, "Authorization", &format!("Bearer {token}"));
            }
            AuthSpec::Basic { username, password } => {
                merged.retain(|(k, _)| !k.eq_ignore_ascii_case("authorization"));
                basic_auth = Some((username.clone(), password.clone()));
            }
        }

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        Ok(Self {
            method: endpoint.method,
            url,
            headers: merged,
            basic_auth,
            timeout: Duration::from_secs(timeout_seconds.max(1).unsigned_abs()),
        })
    }

    /// Build the request for one of a resource's endpoints.
    pub fn for_endpoint(config: &ResourceConfig, endpoint: &EndpointSpec) -> Result<Self, ProbeError> {
        Self::build(
            &config.base_url,
            endpoint,
            &config.auth,
            &config.headers,
            config.timeout_seconds,
        )
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}

fn join_url(base_url: &str, path: &str) -> Result<Url, ProbeError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ProbeError::Transport {
        message: format!("Invalid URL '{joined}': {e}"),
    })
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}

/// A successful probe: 2xx status with a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: u16,
    pub body: Value,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    Timeout,
    Transport,
    HttpStatus,
    DecodeError,
}

/// A failed probe, surfaced verbatim to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// The hard deadline elapsed before a complete response arrived.
    #[error("Probe timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The request could not be built, sent, or its body read.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Non-2xx response. `body` holds the parsed JSON body when there was one.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    /// 2xx response whose body is not JSON.
    #[error("Response from HTTP {status} is not valid JSON: {message}")]
    Decode { status: u16, message: String },
}

impl ProbeError {
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            ProbeError::Timeout { .. } => ProbeErrorKind::Timeout,
            ProbeError::Transport { .. } => ProbeErrorKind::Transport,
            ProbeError::HttpStatus { .. } => ProbeErrorKind::HttpStatus,
            ProbeError::Decode { .. } => ProbeErrorKind::DecodeError,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeError::HttpStatus { status, .. } | ProbeError::Decode { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether a caller with its own retry policy might succeed by retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ProbeError::Timeout { .. } | ProbeError::Transport { .. } => true,
            ProbeError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ProbeError::Decode { .. } => false,
        }
    }

    /// Classify a response status and raw body into a result or an error.
    pub fn from_response(status: u16, body: &[u8], elapsed_ms: u64) -> Result<ProbeResult, ProbeError> {
        if !(200..300).contains(&status) {
            let parsed = serde_json::from_slice::<Value>(body).ok();
            let message = match &parsed {
                Some(json) => error_message(json).unwrap_or_else(|| "request failed".to_string()),
                None => snippet(body),
            };
            return Err(ProbeError::HttpStatus {
                status,
                message,
                body: parsed,
            });
        }

        serde_json::from_slice::<Value>(body)
            .map(|body| ProbeResult {
                status,
                body,
                elapsed_ms,
            })
            .map_err(|e| ProbeError::Decode {
                status,
                message: e.to_string(),
            })
    }
}

fn error_message(json: &Value) -> Option<String> {
    let candidates = [
        json.pointer("/error/message"),
        json.get("message"),
        json.get("error"),
        json.get("detail"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

/// Serializable view of a probe failure for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: ProbeErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl From<&ProbeError> for ProbeFailure {
    fn from(err: &ProbeError) -> Self {
        let body = match err {
            ProbeError::HttpStatus { body, .. } => body.clone(),
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            status: err.status_code(),
            body,
        }
    }
}

/// Performs probe requests.
pub trait Prober: Send + Sync + Clone {
    fn probe(
        &self,
        request: &ProbeRequest,
    ) -> impl Future<Output = Result<ProbeResult, ProbeError>> + Send;
}
