use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bindery_core::{SyncTarget, TriggerOutcome, validate};

use crate::auth::require_api_key;
use crate::dto::{
    CollectionsResponse, DiscoverFieldsRequest, DiscoverRequest, HealthResponse, ProbeRequestBody,
    ProbeResponse, TriggerResponse, ValidateRequest, ValidateResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Largest accepted request body (pasted response documents can be large).
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/probe", post(probe))
        .route("/v1/discover/collections", post(discover_collections))
        .route("/v1/discover/fields", post(discover_fields))
        .route("/v1/discover/suggest", post(suggest))
        .route("/v1/configs/validate", post(validate_config))
        .route("/v1/sync/{kind}/{id}", post(trigger_sync).get(sync_status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/probe",
    request_body = ProbeRequestBody,
    responses(
        (status = 200, description = "Endpoint answered with JSON", body = ProbeResponse),
        (status = 404, description = "Endpoint not in config", body = crate::dto::ErrorResponse),
        (status = 502, description = "Probe failed (transport, HTTP status, or non-JSON body)", body = crate::dto::ErrorResponse),
        (status = 504, description = "Probe timed out", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn probe(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<ProbeRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .onboarding
        .probe(&body.config, body.endpoint_path.as_deref())
        .await?;
    Ok(axum::Json(ProbeResponse::from(result)))
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/discover/collections",
    request_body = DiscoverRequest,
    responses(
        (status = 200, description = "Ranked collection candidates (may be empty)", body = CollectionsResponse),
        (status = 400, description = "Bad request", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn discover_collections(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<DiscoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let candidates = state.onboarding.collections(body.into_source()?).await?;
    Ok(axum::Json(CollectionsResponse {
        total: candidates.len(),
        candidates,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/discover/fields",
    request_body = DiscoverFieldsRequest,
    responses(
        (status = 200, description = "Ranked field candidates, never truncated"),
        (status = 400, description = "Malformed collection path or unknown field", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn discover_fields(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<DiscoverFieldsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (source, collection_path, field) = body.into_parts()?;
    let discovery = state
        .onboarding
        .fields(source, &collection_path, field)
        .await?;
    Ok(axum::Json(discovery))
}

#[utoipa::path(
    post,
    path = "/v1/discover/suggest",
    request_body = DiscoverRequest,
    responses(
        (status = 200, description = "Proposed collection path and field map"),
        (status = 400, description = "Bad request", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "onboarding"
)]
pub async fn suggest(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<DiscoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let suggestion = state.onboarding.suggest(body.into_source()?).await?;
    Ok(axum::Json(suggestion))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/configs/validate",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Config is valid", body = ValidateResponse),
        (status = 422, description = "Every constraint violation, in one list", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "configs"
)]
pub async fn validate_config(
    axum::Json(body): axum::Json<ValidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&body.config).map_err(|errors| ApiError(errors.into()))?;
    Ok(axum::Json(ValidateResponse {
        valid: true,
        errors: Vec::new(),
    }))
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/sync/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "resource or endpoint"),
        ("id" = String, Path, description = "Resource or endpoint ID"),
    ),
    responses(
        (status = 202, description = "Sync dispatched to the job runner", body = TriggerResponse),
        (status = 409, description = "A trigger for this target is still outstanding", body = TriggerResponse),
        (status = 502, description = "Job runner error", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let target = SyncTarget::from_parts(&kind, &id)?;
    let outcome = state.sync.trigger(&target).await?;

    let status = match outcome {
        TriggerOutcome::Dispatched => {
            state.track_until_settled(target.clone());
            StatusCode::ACCEPTED
        }
        TriggerOutcome::Suppressed => StatusCode::CONFLICT,
    };

    Ok((status, axum::Json(TriggerResponse { target, outcome })))
}

#[utoipa::path(
    get,
    path = "/v1/sync/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "resource or endpoint"),
        ("id" = String, Path, description = "Resource or endpoint ID"),
    ),
    responses(
        (status = 200, description = "Latest status snapshot"),
        (status = 502, description = "Job runner error", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "sync"
)]
pub async fn sync_status(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let target = SyncTarget::from_parts(&kind, &id)?;
    let snapshot = match state.sync.snapshot(&target) {
        Some(snapshot) => snapshot,
        None => state.sync.read_now(&target).await?,
    };
    Ok(axum::Json(snapshot))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tracked_targets: state.sync.tracked_targets(),
    })
}
