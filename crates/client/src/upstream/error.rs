//! Upstream API client error types.

use std::sync::Arc;

use super::UpstreamReply;

/// Errors from one upstream API call.
///
/// These never leave the client: [`super::UpstreamClient::fetch`] folds them
/// into a [`super::Miss`].
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// No server credential configured; no call was made.
    #[error("missing API key: no upstream credential configured")]
    MissingApiKey,

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Upstream answered, but not with a usable document.
    #[error("rejected by upstream: {reason} (HTTP {})", .reply.status)]
    Rejected { reason: String, reply: UpstreamReply },
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { UpstreamError::Timeout } else { UpstreamError::Network(Arc::new(err)) }
    }
}
