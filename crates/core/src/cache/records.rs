//! Structured store: one JSON document per (type, id).
//!
//! Documents are stored as raw upstream payloads. Normalization happens on
//! read, so nothing here rewrites stored shapes except the in-place image
//! enrichment.

use super::connection::CatalogDb;
use crate::normalize::document_id;
use crate::{Error, ResourceType};
use serde_json::Value;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl CatalogDb {
    /// Get a stored document by type and id.
    ///
    /// Returns None if no record exists. A row whose payload is not valid
    /// JSON is returned as a JSON string so the caller can still pass it on.
    pub async fn get_record(&self, resource: ResourceType, id: i64) -> Result<Option<Value>, Error> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", resource.table());
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                match conn.query_row(&sql, params![id], |row| row.get::<_, String>(0)) {
                    Ok(data) => Ok(Some(data)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        Ok(raw.map(|data| {
            serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!(%resource, id, error = %e, "stored document is not JSON");
                Value::String(data)
            })
        }))
    }

    /// Insert or overwrite a document.
    ///
    /// When the document carries its own numeric `id`, that value becomes the
    /// stored key instead of `id`. Returns the key actually written.
    pub async fn upsert_record(&self, resource: ResourceType, id: i64, doc: &Value) -> Result<i64, Error> {
        let key = document_id(doc).unwrap_or(id);
        if key != id {
            tracing::debug!(%resource, requested = id, stored = key, "document id overrides requested key");
        }

        let data = serde_json::to_string(doc)?;
        let updated_at = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} (id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            resource.table()
        );

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(&sql, params![key, data, updated_at])?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(key)
    }

    /// Replace the `image` field of a stored document, leaving every other
    /// field untouched.
    ///
    /// Returns false when no record exists for (type, id).
    pub async fn update_record_image(&self, resource: ResourceType, id: i64, image: &Value) -> Result<bool, Error> {
        let image = serde_json::to_string(image)?;
        let updated_at = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE {} SET data = json_set(data, '$.image', json(?1)), updated_at = ?2
             WHERE id = ?3 AND json_valid(data) AND json_type(data) = 'object'",
            resource.table()
        );

        let changed = self
            .conn
            .call(move |conn| -> Result<usize, Error> { Ok(conn.execute(&sql, params![image, updated_at, id])?) })
            .await
            .map_err(Error::from)?;

        Ok(changed > 0)
    }

    /// Whether the table for this type exists.
    pub async fn has_table(&self, resource: ResourceType) -> Result<bool, Error> {
        let table = resource.table();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    params![table],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }
}
