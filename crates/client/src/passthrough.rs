//! Passthrough forwarder.
//!
//! Re-issues an inbound path and query against the upstream API and hands
//! back the status, content type and body untouched. Nothing is stored.

use reqwest::header;
use std::sync::Arc;

use cvcache_core::Error;

use crate::upstream::{UpstreamConfig, UpstreamReply};

#[derive(Debug, Clone)]
pub struct Passthrough {
    http: reqwest::Client,
    config: Arc<UpstreamConfig>,
}

impl Passthrough {
    pub fn new(config: UpstreamConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config: Arc::new(config) })
    }

    /// Query parameters as sent upstream.
    ///
    /// The server credential replaces any caller `api_key` when one is
    /// configured; `format=json` is added only when the caller gave no format.
    fn forwarded_params(&self, params: &[(String, String)]) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = match &self.config.api_key {
            Some(key) => {
                let mut out: Vec<_> = params.iter().filter(|(k, _)| k != "api_key").cloned().collect();
                out.push(("api_key".to_string(), key.clone()));
                out
            }
            None => params.to_vec(),
        };

        if !out.iter().any(|(k, _)| k == "format") {
            out.push(("format".to_string(), "json".to_string()));
        }
        out
    }

    /// Forward `path` with `params` and return the upstream reply verbatim.
    ///
    /// # Errors
    ///
    /// Returns `Error::UpstreamUnavailable` when no reply arrives (network
    /// failure or timeout). Any HTTP status, success or not, is a reply.
    pub async fn forward(&self, path: &str, params: &[(String, String)]) -> Result<UpstreamReply, Error> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        tracing::debug!(url = %url, "forwarding request");

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(&self.forwarded_params(params))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        UpstreamReply::read(response)
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))
    }
}
