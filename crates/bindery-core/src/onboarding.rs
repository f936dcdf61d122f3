use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collections::{CollectionCandidate, discover_collections};
use crate::error::AppError;
use crate::fields::{FieldDiscovery, SCORE_NO_MATCH, discover_all_fields, discover_fields};
use crate::probe::{ProbeRequest, ProbeResult, Prober};
use crate::resource::{CanonicalField, EndpointSpec, FieldMap, ResourceConfig, empty_field_map};

/// Where discovery reads its document from.
///
/// Both variants feed the same discovery functions; a fresh probe only adds
/// the network step in front.
#[derive(Debug, Clone)]
pub enum DiscoverySource {
    /// A previously probed (or pasted) response body.
    Document(Value),
    /// Probe `endpoint_path` (or the config's default endpoint) first.
    Probe {
        config: Box<ResourceConfig>,
        endpoint_path: Option<String>,
    },
}

/// A proposed collection path and field map for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSuggestion {
    /// The top-ranked collection, if the document has any.
    pub collection: Option<CollectionCandidate>,
    /// Number of collection candidates considered.
    pub collection_candidates: usize,
    /// All six canonical keys; unmatched fields map to an empty path.
    pub field_map: FieldMap,
    /// Candidate count per field, so callers can tell "nothing found" apart
    /// from "nothing relevant found".
    pub candidate_counts: BTreeMap<CanonicalField, usize>,
}

impl EndpointSuggestion {
    /// Turn the suggestion into an endpoint definition, if a collection was
    /// found.
    pub fn into_endpoint(self, label: &str, path: &str) -> Option<EndpointSpec> {
        let collection = self.collection?;
        let mut endpoint = EndpointSpec::new(label, path, collection.path.to_string());
        endpoint.field_map = self.field_map;
        Some(endpoint)
    }
}

/// Composes probing and discovery into the onboarding flow.
pub struct OnboardingService<P: Prober> {
    prober: P,
}

impl<P: Prober> OnboardingService<P> {
    pub fn new(prober: P) -> Self {
        Self { prober }
    }

    /// Probe one of the config's endpoints (the default one when
    /// `endpoint_path` is `None`).
    pub async fn probe(
        &self,
        config: &ResourceConfig,
        endpoint_path: Option<&str>,
    ) -> Result<ProbeResult, AppError> {
        let endpoint = resolve_endpoint(config, endpoint_path)?;
        let request = ProbeRequest::for_endpoint(config, endpoint)?;

        tracing::info!(
            method = %request.method,
            url = %redacted(&request),
            timeout_secs = request.timeout_secs(),
            "Probing endpoint"
        );
        let result = self.prober.probe(&request).await;
        match &result {
            Ok(ok) => tracing::info!(status = ok.status, elapsed_ms = ok.elapsed_ms, "Probe succeeded"),
            Err(e) => tracing::warn!(kind = ?e.kind(), error = %e, "Probe failed"),
        }
        Ok(result?)
    }

    /// The document discovery runs over.
    pub async fn document(&self, source: DiscoverySource) -> Result<Value, AppError> {
        match source {
            DiscoverySource::Document(doc) => Ok(doc),
            DiscoverySource::Probe {
                config,
                endpoint_path,
            } => Ok(self.probe(&config, endpoint_path.as_deref()).await?.body),
        }
    }

    pub async fn collections(
        &self,
        source: DiscoverySource,
    ) -> Result<Vec<CollectionCandidate>, AppError> {
        let doc = self.document(source).await?;
        let candidates = discover_collections(&doc);
        tracing::debug!(count = candidates.len(), "Collections discovered");
        Ok(candidates)
    }

    pub async fn fields(
        &self,
        source: DiscoverySource,
        collection_path: &str,
        field: CanonicalField,
    ) -> Result<FieldDiscovery, AppError> {
        let doc = self.document(source).await?;
        Ok(discover_fields(&doc, collection_path, field)?)
    }

    /// Pick the top collection and, per canonical field, the top candidate
    /// that matched at all.
    pub async fn suggest(&self, source: DiscoverySource) -> Result<EndpointSuggestion, AppError> {
        let doc = self.document(source).await?;
        Ok(suggest_endpoint(&doc))
    }
}

/// Suggestion for an already sampled document.
pub fn suggest_endpoint(doc: &Value) -> EndpointSuggestion {
    let candidates = discover_collections(doc);
    let collection_candidates = candidates.len();
    let mut field_map = empty_field_map();
    let mut candidate_counts = BTreeMap::new();

    let collection = candidates.into_iter().next();
    if let Some(collection) = &collection {
        // Candidate paths come from discovery, so the collection path is
        // always well formed.
        let discovered = discover_all_fields(doc, &collection.path.to_string()).unwrap_or_default();
        for (field, discovery) in discovered {
            candidate_counts.insert(field, discovery.total);
            if let Some(best) = discovery.best().filter(|c| c.score > SCORE_NO_MATCH) {
                field_map.insert(field.as_str().to_string(), best.path.to_string());
            }
        }
    }

    EndpointSuggestion {
        collection,
        collection_candidates,
        field_map,
        candidate_counts,
    }
}

fn resolve_endpoint<'a>(
    config: &'a ResourceConfig,
    endpoint_path: Option<&str>,
) -> Result<&'a EndpointSpec, AppError> {
    match endpoint_path {
        Some(path) => config
            .endpoint(path)
            .ok_or_else(|| AppError::EndpointNotFound(path.to_string())),
        None => config
            .default_endpoint_spec()
            .ok_or_else(|| AppError::EndpointNotFound(config.default_endpoint.clone())),
    }
}

/// URL without its query string, which may carry an API key.
fn redacted(request: &ProbeRequest) -> String {
    let mut url = request.url.clone();
    url.set_query(None);
    url.to_string()
}
