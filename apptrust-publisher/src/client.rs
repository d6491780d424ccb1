//! HTTP client for the unified policy REST API

use apptrust_core::EntityKind;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{Method, Response, Url};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::{PublishError, PublishTarget, RemoteResponse};

/// Connection settings for the upstream policy service
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.jfrog.io".to_string(),
            api_token: "changeme".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Publishes templates and rules over HTTP with a bearer token
pub struct UnifiedPolicyClient {
    http: reqwest::Client,
    base_url: String,
}

impl UnifiedPolicyClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, PublishError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|e| PublishError::Config(format!("API token is not a valid header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PublishError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_path(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Template => "/unifiedpolicy/api/v1/templates",
            EntityKind::Rule => "/unifiedpolicy/api/v1/rules",
        }
    }

    /// Collection URL of `kind`, or the resource URL when `remote_id` is set.
    /// The remote id is encoded as a single path segment.
    fn url(&self, kind: EntityKind, remote_id: Option<&str>) -> Result<Url, PublishError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, Self::collection_path(kind)))
            .map_err(|e| PublishError::Config(format!("Invalid upstream URL: {}", e)))?;
        if let Some(remote_id) = remote_id {
            let not_a_base = || PublishError::Config(format!("Not a base URL: {}", self.base_url));
            url.path_segments_mut().map_err(|_| not_a_base())?.push(remote_id);
        }
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        payload: &Value,
    ) -> Result<Response, PublishError> {
        tracing::debug!("{} {}", method, url);

        let response = self.http.request(method, url).json(payload).send().await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode a success body: empty → `{}`, non-JSON → `{"raw": text}`.
    async fn payload_from_response(
        response: Response,
    ) -> Result<Map<String, Value>, PublishError> {
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Map::new());
        }

        if !is_json {
            let trimmed = text.trim();
            let mut map = Map::new();
            if !trimmed.is_empty() {
                map.insert("raw".to_string(), Value::String(trimmed.to_string()));
            }
            return Ok(map);
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(PublishError::MalformedResponse(format!(
                "expected a JSON object, got {}",
                other
            ))),
            Err(e) => Err(PublishError::MalformedResponse(format!(
                "Failed to parse JSON response: {}",
                e
            ))),
        }
    }
}

/// Read `id` as a string whether the upstream sent it as text or a number
fn id_of(body: &Map<String, Value>) -> Option<String> {
    match body.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn id_from_location(location: Option<&HeaderValue>) -> Option<String> {
    let location = location?.to_str().ok()?;
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl PublishTarget for UnifiedPolicyClient {
    async fn create(
        &self,
        kind: EntityKind,
        payload: &Value,
    ) -> Result<RemoteResponse, PublishError> {
        let response = self
            .request(Method::POST, self.url(kind, None)?, payload)
            .await?;
        let status_code = response.status().as_u16();
        let location = id_from_location(response.headers().get(LOCATION));

        let body = Self::payload_from_response(response).await?;
        let id = id_of(&body).or(location);

        tracing::info!("Created remote {} (status {}, id {:?})", kind, status_code, id);
        Ok(RemoteResponse {
            id,
            status_code,
            body: Value::Object(body),
        })
    }

    async fn update(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
    ) -> Result<RemoteResponse, PublishError> {
        let url = self.url(kind, Some(remote_id))?;
        let response = self.request(Method::PUT, url, payload).await?;
        let status_code = response.status().as_u16();

        let body = Self::payload_from_response(response).await?;
        let id = id_of(&body).unwrap_or_else(|| remote_id.to_string());

        tracing::info!("Updated remote {} {} (status {})", kind, id, status_code);
        Ok(RemoteResponse {
            id: Some(id),
            status_code,
            body: Value::Object(body),
        })
    }
}
