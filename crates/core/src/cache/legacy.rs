//! Read-only access to the response cache left behind by earlier releases.
//!
//! Rows hold complete upstream envelopes keyed by (type name, id as text).
//! Nothing in the current write path touches this table.

use super::connection::CatalogDb;
use crate::{Error, ResourceType};
use serde_json::Value;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached envelope and when it was written.
#[derive(Debug, Clone)]
pub struct LegacyResponse {
    pub envelope: Value,
    pub cached_at: Option<String>,
}

impl LegacyResponse {
    /// The `results` member of the envelope, if present and not null.
    pub fn results(&self) -> Option<&Value> {
        self.envelope.get("results").filter(|v| !v.is_null())
    }

    /// The cached document, when the envelope records a successful reply.
    ///
    /// Cached error replies (`status_code` other than 1, or `results` that is
    /// not an object) hold no document and count as a miss.
    pub fn document(&self) -> Option<&Value> {
        let succeeded = match self.envelope.get("status_code") {
            None => true,
            Some(code) => code.as_i64() == Some(1),
        };
        self.results().filter(|r| succeeded && r.is_object())
    }
}

impl CatalogDb {
    /// Look up a cached envelope for (type, id).
    ///
    /// A row whose payload is not JSON is surfaced as a string envelope
    /// rather than dropped.
    pub async fn get_legacy(&self, resource: ResourceType, id: i64) -> Result<Option<LegacyResponse>, Error> {
        let resource_type = resource.name();
        let resource_id = id.to_string();

        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, Option<String>)>, Error> {
                let result = conn.query_row(
                    "SELECT response_data, CAST(cached_at AS TEXT) FROM api_cache
                     WHERE resource_type = ?1 AND resource_id = ?2",
                    params![resource_type, resource_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        Ok(row.map(|(data, cached_at)| {
            let envelope = serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!(%resource, id, error = %e, "legacy cache entry is not JSON");
                Value::String(data)
            });
            LegacyResponse { envelope, cached_at }
        }))
    }
}
