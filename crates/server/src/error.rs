//! Structured errors for the HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use cvcache_core::Error;

/// Errors raised by the non-resolver endpoints.
///
/// Rendered in the same envelope shape the resolver uses for failures.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error(transparent)]
    Core(#[from] Error),
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotFound(_) | ProxyError::Core(Error::InvalidHash(_)) => StatusCode::NOT_FOUND,
            ProxyError::Core(e) if e.is_store() => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let body = json!({ "status_code": 0, "error": self.to_string(), "results": [] });
        (status, Json(body)).into_response()
    }
}
