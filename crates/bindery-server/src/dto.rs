use serde::{Deserialize, Serialize};
use serde_json::Value;

use bindery_core::{
    AppError, CanonicalField, CollectionCandidate, DiscoverySource, ProbeResult, ResourceConfig,
    SyncTarget, TriggerOutcome, ValidationError,
};

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ProbeRequestBody {
    /// Resource config holding base URL, auth, headers and endpoints.
    #[schema(value_type = Object)]
    pub config: ResourceConfig,
    /// Endpoint path to probe; the config's default endpoint when omitted.
    pub endpoint_path: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProbeResponse {
    pub status: u16,
    pub elapsed_ms: u64,
    #[schema(value_type = Object)]
    pub body: Value,
}

impl From<ProbeResult> for ProbeResponse {
    fn from(result: ProbeResult) -> Self {
        Self {
            status: result.status,
            elapsed_ms: result.elapsed_ms,
            body: result.body,
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Either `document` (a previously probed response body) or `config`
/// (probe first, then discover).
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DiscoverRequest {
    #[schema(value_type = Option<Object>)]
    pub document: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<ResourceConfig>,
    pub endpoint_path: Option<String>,
}

impl DiscoverRequest {
    pub fn into_source(self) -> Result<DiscoverySource, AppError> {
        source(self.document, self.config, self.endpoint_path)
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DiscoverFieldsRequest {
    #[schema(value_type = Option<Object>)]
    pub document: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<ResourceConfig>,
    pub endpoint_path: Option<String>,
    /// Collection path, e.g. `items` or `response.docs`.
    pub collection_path: String,
    /// Canonical field: title, authors, subject, isbn, issn or thumbnail.
    pub field: String,
}

impl DiscoverFieldsRequest {
    pub fn into_parts(self) -> Result<(DiscoverySource, String, CanonicalField), AppError> {
        let field = self.field.parse::<CanonicalField>().map_err(AppError::Generic)?;
        let source = source(self.document, self.config, self.endpoint_path)?;
        Ok((source, self.collection_path, field))
    }
}

fn source(
    document: Option<Value>,
    config: Option<ResourceConfig>,
    endpoint_path: Option<String>,
) -> Result<DiscoverySource, AppError> {
    match (document, config) {
        (Some(doc), None) => Ok(DiscoverySource::Document(doc)),
        (None, Some(config)) => Ok(DiscoverySource::Probe {
            config: Box::new(config),
            endpoint_path,
        }),
        (Some(_), Some(_)) => Err(AppError::Generic(
            "Provide either 'document' or 'config', not both".into(),
        )),
        (None, None) => Err(AppError::Generic(
            "One of 'document' or 'config' is required".into(),
        )),
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CollectionsResponse {
    #[schema(value_type = Vec<Object>)]
    pub candidates: Vec<CollectionCandidate>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ValidateRequest {
    #[schema(value_type = Object)]
    pub config: ResourceConfig,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    #[schema(value_type = Vec<Object>)]
    pub errors: Vec<ValidationError>,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TriggerResponse {
    #[schema(value_type = Object)]
    pub target: SyncTarget,
    /// `dispatched` or `suppressed`.
    #[schema(value_type = String)]
    pub outcome: TriggerOutcome,
}

// ---------------------------------------------------------------------------
// Health & Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Targets with a live poll loop.
    pub tracked_targets: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Structured detail: the full validation error list, or the probe failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}
