//! Unified error types for cvcache.
//!
//! Display strings carry a stable upper-case code prefix so that log lines
//! and structured error bodies can be grepped by failure class.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the store, client and server crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Upstream timed out, answered with a failure status, or was unreachable.
    #[error("UPSTREAM_UNAVAILABLE: {0}")]
    UpstreamUnavailable(String),

    /// Store operation failed.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(tokio_rusqlite::Error),

    /// A stored or upstream payload is not a JSON document.
    #[error("MALFORMED_DOCUMENT: {0}")]
    MalformedDocument(String),

    /// Invalid input parameters (e.g., bad filter field).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Migration failed to apply.
    #[error("STORE_UNAVAILABLE: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid content hash format.
    #[error("INVALID_HASH: {0}")]
    InvalidHash(String),

    /// Fetched body exceeded the configured byte limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response from a non-API fetch.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),
}

impl Error {
    /// True for failures of the local store, which the resolver degrades past.
    pub fn is_store(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::MigrationFailed(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::StoreUnavailable(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::StoreUnavailable(tokio_rusqlite::Error::Close(c)),
            _ => Error::StoreUnavailable(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::StoreUnavailable(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedDocument(err.to_string())
    }
}
