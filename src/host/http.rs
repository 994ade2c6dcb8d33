//! REST implementation of the project gateway and auth service.

use crate::error::{BridgeError, Result};
use crate::host::gateway::{AuthService, Profile, ProjectGateway};
use crate::host::record::{ProjectId, ProjectPatch, ProjectRecord};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Map HTTP error responses to bridge errors.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> BridgeError {
    let detail = extract_error_message(body);
    BridgeError::Api(format!("HTTP {status}: {detail}"))
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}

/// Client for the host's project and auth endpoints.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: Url,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpGateway {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if `base_url` does not parse or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BridgeError::Config(format!("invalid API base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BridgeError::Config(format!(
                "API base URL {base_url} cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            client,
            bearer_token: None,
        })
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await.map_err(|e| {
            tracing::error!(error = %e, "API request failed");
            BridgeError::Api(format!("connection error: {e}"))
        })?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read body".into());
        tracing::warn!(status = %status, body = %body, "API request returned error");
        Err(map_http_error(status, &body))
    }

    async fn send_for_record(&self, request: reqwest::RequestBuilder) -> Result<ProjectRecord> {
        self.send(request)
            .await?
            .json::<ProjectRecord>()
            .await
            .map_err(|e| BridgeError::Api(format!("invalid project record in response: {e}")))
    }
}

#[async_trait]
impl ProjectGateway for HttpGateway {
    async fn fetch(&self, id: &ProjectId) -> Result<ProjectRecord> {
        let url = self.endpoint(&["api", "projects", id.as_str()]);
        tracing::debug!(%url, "fetching project");
        self.send_for_record(self.client.get(url)).await
    }

    async fn create(&self, record: &ProjectRecord) -> Result<ProjectRecord> {
        let url = self.endpoint(&["api", "projects"]);
        tracing::debug!(%url, "creating project");
        self.send_for_record(self.client.post(url).json(record)).await
    }

    async fn update(&self, id: &ProjectId, record: &ProjectRecord) -> Result<ProjectRecord> {
        let url = self.endpoint(&["api", "projects", id.as_str()]);
        tracing::debug!(%url, "updating project");
        self.send_for_record(self.client.put(url).json(record)).await
    }

    async fn patch(&self, id: &ProjectId, patch: &ProjectPatch) -> Result<ProjectRecord> {
        let url = self.endpoint(&["api", "projects", id.as_str()]);
        tracing::debug!(%url, "patching project");
        self.send_for_record(self.client.patch(url).json(patch)).await
    }
}

#[async_trait]
impl AuthService for HttpGateway {
    async fn profile(&self) -> Result<Option<Profile>> {
        let url = self.endpoint(&["api", "auth", "me"]);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| BridgeError::Api(format!("connection error: {e}")))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }
        response
            .json::<Profile>()
            .await
            .map(Some)
            .map_err(|e| BridgeError::Api(format!("invalid profile in response: {e}")))
    }

    async fn logout(&self) -> Result<()> {
        let url = self.endpoint(&["api", "auth", "logout"]);
        self.send(self.client.post(url)).await.map(|_| ())
    }
}
