use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bindery API",
        version = "0.1.0",
        description = "Onboard JSON APIs into the book catalog: probe endpoints, discover collections and fields, validate resource configs, and track syncs."
    ),
    paths(
        crate::routes::probe,
        crate::routes::discover_collections,
        crate::routes::discover_fields,
        crate::routes::suggest,
        crate::routes::validate_config,
        crate::routes::trigger_sync,
        crate::routes::sync_status,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::ProbeRequestBody,
        crate::dto::ProbeResponse,
        crate::dto::DiscoverRequest,
        crate::dto::DiscoverFieldsRequest,
        crate::dto::CollectionsResponse,
        crate::dto::ValidateRequest,
        crate::dto::ValidateResponse,
        crate::dto::TriggerResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "onboarding", description = "Endpoint probing and response discovery"),
        (name = "configs", description = "Resource config validation"),
        (name = "sync", description = "Sync triggering and status tracking"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Server API key. Set via BINDERY_SERVER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
