use std::time::Duration;

use bindery_core::error::AppError;
use bindery_core::runner::SyncJobRunner;
use bindery_core::sync::{ResourceSyncReport, SyncJobStatus, SyncTarget};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

/// Sync job runner client speaking the runner's HTTP API.
///
/// Routes, relative to the base URL:
/// - `POST resources/{id}/sync`, `POST endpoints/{id}/sync`
/// - `GET resources/{id}/status`, `GET endpoints/{id}/status`
#[derive(Clone)]
pub struct HttpSyncRunner {
    client: Client,
    base_url: Url,
    token: Option<String>,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct EndpointStatusBody {
    sync_status: SyncJobStatus,
}

impl HttpSyncRunner {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, AppError> {
        Self::with_timeout(base_url, token, Duration::from_secs(10))
    }

    pub fn with_timeout(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid runner URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(AppError::ConfigError(format!(
                "Runner URL '{base_url}' must be an http(s) URL"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn url(&self, target: &SyncTarget, action: &str) -> Result<Url, AppError> {
        let collection = match target {
            SyncTarget::Resource(_) => "resources",
            SyncTarget::Endpoint(_) => "endpoints",
        };
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::ConfigError(format!("Runner URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend([collection, target.id(), action]);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let response = self.authorize(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| {
                json.get("message")
                    .or_else(|| json.get("error"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        Err(AppError::RunnerError {
            message,
            status_code: status.as_u16(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let response = self.send(self.client.get(url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl SyncJobRunner for HttpSyncRunner {
    async fn dispatch(&self, target: &SyncTarget) -> Result<(), AppError> {
        let url = self.url(target, "sync")?;
        tracing::debug!(%target, "Dispatching sync to runner");
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn resource_status(&self, resource_id: &str) -> Result<ResourceSyncReport, AppError> {
        let url = self.url(&SyncTarget::Resource(resource_id.to_string()), "status")?;
        self.get_json(url).await
    }

    async fn endpoint_status(&self, endpoint_id: &str) -> Result<SyncJobStatus, AppError> {
        let url = self.url(&SyncTarget::Endpoint(endpoint_id.to_string()), "status")?;
        let body: EndpointStatusBody = self.get_json(url).await?;
        Ok(body.sync_status)
    }
}
