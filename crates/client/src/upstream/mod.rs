//! Upstream catalog API client.
//!
//! ### Behaviour
//!
//! - **URL**: built from the shared resource-type tables
//!   (`/api/{type}/{prefix}-{id}/` or `/api/{plural}/`).
//! - **Authentication**: the server credential is injected as `api_key`;
//!   a caller-supplied `api_key` is never forwarded.
//! - **Format**: `format=json` is always requested.
//! - **Timeout**: one bounded attempt, no retries.
//! - **Outcome**: a JSON envelope with `status_code == 1`, or a [`Miss`].
//!   Errors never propagate to the caller.

pub mod error;

pub use error::UpstreamError;

use bytes::Bytes;
use reqwest::header;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cvcache_core::{AppConfig, Error, Route};

/// Upstream API client configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Server-held credential. Without it no call is made.
    pub api_key: Option<String>,
    /// Base URL (default: https://comicvine.gamespot.com).
    pub base_url: String,
    /// Request timeout (default: 30s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://comicvine.gamespot.com".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: "cvcache/0.1".to_string(),
        }
    }
}

impl From<&AppConfig> for UpstreamConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.upstream_base_url.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// An upstream HTTP answer kept byte for byte.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamReply {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.bytes().await?;
        Ok(Self { status, content_type, body })
    }
}

/// Why an upstream lookup produced no document.
#[derive(Debug, Clone)]
pub enum Miss {
    /// No credential configured; nothing was sent.
    NoCredential,
    /// Timeout or network failure.
    Unreachable(String),
    /// Upstream answered with a failure status, a non-JSON body, or an
    /// envelope whose `status_code` is not 1.
    Rejected(UpstreamReply),
}

/// Result of one upstream lookup.
#[derive(Debug, Clone)]
pub enum UpstreamOutcome {
    /// The full upstream envelope.
    Document(Value),
    Miss(Miss),
}

/// Upstream catalog API client.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: Arc<UpstreamConfig>,
}

impl UpstreamClient {
    /// Create a new client with the given configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config: Arc::new(config) })
    }

    /// Whether a server credential is configured.
    pub fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Absolute upstream URL for a route.
    pub fn url_for(&self, route: &Route) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), route.upstream_path())
    }

    /// Caller parameters minus any credential or format, plus ours.
    fn outbound_params(params: &[(String, String)], api_key: &str) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| k != "api_key" && k != "format")
            .cloned()
            .collect();
        out.push(("api_key".to_string(), api_key.to_string()));
        out.push(("format".to_string(), "json".to_string()));
        out
    }

    async fn request(&self, route: &Route, params: &[(String, String)]) -> Result<Value, UpstreamError> {
        let api_key = self.config.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)?;

        let start = Instant::now();
        let url = self.url_for(route);

        tracing::debug!(url = %url, "fetching from upstream");

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(&Self::outbound_params(params, api_key))
            .send()
            .await?;

        let reply = UpstreamReply::read(response).await?;

        tracing::debug!(status = reply.status, ms = start.elapsed().as_millis() as u64, "upstream response");

        if !(200..300).contains(&reply.status) {
            return Err(UpstreamError::Rejected { reason: format!("HTTP {}", reply.status), reply });
        }

        let envelope: Value = match serde_json::from_slice(&reply.body) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) => return Err(UpstreamError::Rejected { reason: "envelope is not an object".into(), reply }),
            Err(e) => return Err(UpstreamError::Rejected { reason: format!("non-JSON body: {e}"), reply }),
        };

        if let Some(code) = envelope.get("status_code")
            && code.as_i64() != Some(1)
        {
            let reason = format!("status_code {code}");
            return Err(UpstreamError::Rejected { reason, reply });
        }

        Ok(envelope)
    }

    /// Fetch one detail or list envelope.
    ///
    /// Every caller parameter except `api_key` and `format` is forwarded.
    pub async fn fetch(&self, route: &Route, params: &[(String, String)]) -> UpstreamOutcome {
        match self.request(route, params).await {
            Ok(envelope) => UpstreamOutcome::Document(envelope),
            Err(UpstreamError::MissingApiKey) => {
                tracing::debug!(resource = %route.resource, "no credential, skipping upstream");
                UpstreamOutcome::Miss(Miss::NoCredential)
            }
            Err(UpstreamError::Rejected { reason, reply }) => {
                tracing::warn!(resource = %route.resource, id = ?route.id, %reason, "upstream rejected request");
                UpstreamOutcome::Miss(Miss::Rejected(reply))
            }
            Err(e) => {
                tracing::warn!(resource = %route.resource, id = ?route.id, error = %e, "upstream unreachable");
                UpstreamOutcome::Miss(Miss::Unreachable(e.to_string()))
            }
        }
    }
}
