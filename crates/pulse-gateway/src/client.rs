//! Backend REST API client.

use crate::governance::{BootstrapAdminRequest, BootstrapAdminResponse, GovernanceStatus};
use async_trait::async_trait;
use pulse_protocol_types::{BackendGateway, GatewayError, NotificationRecord, Profile};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn map_http_error(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Network(err.to_string())
    }
}

/// REST client for the Quality Pulse backend.
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    /// Normalized API base, e.g. `http://localhost:5000/api`.
    api_url: String,
    /// Server root without the `/api` suffix, e.g. `http://localhost:5000`.
    host_url: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `api_url` - normalized API base (see `pulse_config::api_base_url`)
    /// * `host_url` - server root (see `pulse_config::realtime_base_url`)
    pub fn new(api_url: impl Into<String>, host_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            host_url: host_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Server root the health probe and realtime channel use.
    pub fn host_url(&self) -> &str {
        &self.host_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// `{api}/notifications/{id}/read` with `id` escaped as a single segment.
    fn notification_read_url(&self, id: &str) -> Result<Url, GatewayError> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(GatewayError::Validation(format!(
                "Invalid notification id: {:?}",
                id
            )));
        }

        let mut url = Url::parse(&self.api_url)
            .map_err(|e| GatewayError::Validation(format!("Invalid API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Validation(format!("Invalid API URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["notifications", id, "read"]);
        Ok(url)
    }

    /// Liveness probe, `GET {host}/health`. Non-JSON bodies come back as a
    /// JSON string.
    pub async fn health(&self) -> Result<Value, GatewayError> {
        let url = format!("{}/health", self.host_url);
        debug!(url = %url, "Checking backend health");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = self.check_response(response).await?;
        let body = response.text().await.map_err(map_http_error)?;

        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    /// Whether the first administrator has been created.
    pub async fn governance_status(&self) -> Result<GovernanceStatus, GatewayError> {
        self.get_json(&self.endpoint("governance/status"), None).await
    }

    /// Create the first administrator account. Validated locally first.
    pub async fn bootstrap_admin(
        &self,
        request: &BootstrapAdminRequest,
    ) -> Result<BootstrapAdminResponse, GatewayError> {
        request.validate()?;

        let url = self.endpoint("governance/bootstrap-admin");
        debug!(email = %request.email, "Bootstrapping admin account");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = self.check_response(response).await?;
        response.json().await.map_err(map_http_error)
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<T, GatewayError> {
        let response = self
            .authorized(self.http_client.get(url), token)
            .send()
            .await
            .map_err(map_http_error)?;

        let response = self.check_response(response).await?;
        response.json().await.map_err(map_http_error)
    }

    /// Send a request whose response body is ignored.
    async fn send_ack(
        &self,
        builder: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .authorized(builder, Some(token))
            .send()
            .await
            .map_err(map_http_error)?;

        self.check_response(response).await?;
        Ok(())
    }

    /// Check HTTP response for errors. The backend reports failures as
    /// `{ "message": "..." }`; other bodies are passed through verbatim.
    async fn check_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GatewayError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        error!(status, path = %url, message = %message, "Backend request failed");
        Err(GatewayError::Api { status, message })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.api_url)
            .field("host_url", &self.host_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackendGateway for ApiClient {
    async fn fetch_profile(&self, token: &str) -> Result<Profile, GatewayError> {
        debug!("Syncing profile with backend");
        self.get_json(&self.endpoint("auth/me"), Some(token)).await
    }

    async fn list_notifications(
        &self,
        token: &str,
    ) -> Result<Vec<NotificationRecord>, GatewayError> {
        let records: Vec<NotificationRecord> = self
            .get_json(&self.endpoint("notifications"), Some(token))
            .await?;
        debug!(count = records.len(), "Fetched notifications");
        Ok(records)
    }

    async fn mark_notification_read(&self, token: &str, id: &str) -> Result<(), GatewayError> {
        let url = self.notification_read_url(id)?;
        debug!(notification_id = id, "Marking notification read");
        self.send_ack(self.http_client.patch(url), token).await
    }

    async fn mark_all_notifications_read(&self, token: &str) -> Result<(), GatewayError> {
        let url = self.endpoint("notifications/read-all");
        debug!("Marking all notifications read");
        self.send_ack(self.http_client.post(&url), token).await
    }
}
