use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use bindery_core::error::AppError;
use bindery_core::probe::{ProbeError, ProbeFailure};

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Path(_) => (StatusCode::BAD_REQUEST, "invalid_path"),
            AppError::SerializationError(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            AppError::Generic(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::EndpointNotFound(_) => (StatusCode::NOT_FOUND, "endpoint_not_found"),
            AppError::Probe(ProbeError::Timeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "probe_timeout")
            }
            AppError::Probe(_) => (StatusCode::BAD_GATEWAY, "probe_failed"),
            AppError::RunnerError { .. } => (StatusCode::BAD_GATEWAY, "runner_error"),
            AppError::NetworkError(_) | AppError::HttpError(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::TrackingLimit { .. } => (StatusCode::SERVICE_UNAVAILABLE, "tracking_limit"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        };

        let details = match &self.0 {
            AppError::Validation(errors) => serde_json::to_value(errors.errors()).ok(),
            AppError::Probe(probe) => serde_json::to_value(ProbeFailure::from(probe)).ok(),
            _ => None,
        };

        if status.is_server_error() {
            tracing::warn!(error = %self.0, %status, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
            details,
        };

        (status, axum::Json(body)).into_response()
    }
}
