//! Image store: content-addressed binaries.
//!
//! Rows are immutable. The first writer for a hash wins and later writes for
//! the same hash are silently dropped.

use super::connection::CatalogDb;
use super::hash::{content_hash, is_content_hash};
use crate::Error;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached image binary.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub hash: String,
    pub source_url: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub fetched_at: String,
}

impl ImageAsset {
    /// Build an asset for `source_url`, deriving its content hash.
    pub fn new(source_url: &str, content_type: Option<String>, bytes: Vec<u8>) -> Result<Self, Error> {
        let hash = content_hash(source_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            hash,
            source_url: source_url.to_string(),
            content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes,
            fetched_at: Utc::now().to_rfc3339(),
        })
    }
}

impl CatalogDb {
    /// Store an image unless one with the same hash already exists.
    ///
    /// Returns true when this call wrote the row.
    pub async fn put_image(&self, asset: &ImageAsset) -> Result<bool, Error> {
        let asset = asset.clone();
        let inserted = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                Ok(conn.execute(
                    "INSERT INTO images (hash, source_url, content_type, bytes, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(hash) DO NOTHING",
                    params![asset.hash, asset.source_url, asset.content_type, asset.bytes, asset.fetched_at],
                )?)
            })
            .await
            .map_err(Error::from)?;

        Ok(inserted > 0)
    }

    /// Get an image by content hash.
    pub async fn get_image(&self, hash: &str) -> Result<Option<ImageAsset>, Error> {
        if !is_content_hash(hash) {
            return Err(Error::InvalidHash(hash.to_string()));
        }

        let hash = hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ImageAsset>, Error> {
                let result = conn.query_row(
                    "SELECT hash, source_url, content_type, bytes, fetched_at FROM images WHERE hash = ?1",
                    params![hash],
                    |row| {
                        Ok(ImageAsset {
                            hash: row.get(0)?,
                            source_url: row.get(1)?,
                            content_type: row.get(2)?,
                            bytes: row.get(3)?,
                            fetched_at: row.get(4)?,
                        })
                    },
                );

                match result {
                    Ok(asset) => Ok(Some(asset)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Whether an image with this hash is stored.
    pub async fn has_image(&self, hash: &str) -> Result<bool, Error> {
        let hash = hash.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM images WHERE hash = ?1)",
                    params![hash],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get_image() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let asset = ImageAsset::new("https://img.test/a.jpg", Some("image/jpeg".into()), vec![1, 2, 3]).unwrap();

        assert!(db.put_image(&asset).await.unwrap());

        let stored = db.get_image(&asset.hash).await.unwrap().unwrap();
        assert_eq!(stored.bytes, vec![1, 2, 3]);
        assert_eq!(stored.content_type, "image/jpeg");
        assert_eq!(stored.source_url, "https://img.test/a.jpg");
        assert!(db.has_image(&asset.hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let first = ImageAsset::new("https://img.test/a.jpg", None, vec![1]).unwrap();
        let second = ImageAsset::new("https://IMG.test/a.jpg", Some("image/png".into()), vec![2]).unwrap();
        assert_eq!(first.hash, second.hash);

        assert!(db.put_image(&first).await.unwrap());
        assert!(!db.put_image(&second).await.unwrap());

        let stored = db.get_image(&first.hash).await.unwrap().unwrap();
        assert_eq!(stored.bytes, vec![1]);
        assert_eq!(stored.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_get_missing_image() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let hash = content_hash("https://img.test/none.jpg").unwrap();
        assert!(db.get_image(&hash).await.unwrap().is_none());
        assert!(!db.has_image(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_image_rejects_bad_hash() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        let result = db.get_image("../etc/passwd").await;
        assert!(matches!(result, Err(Error::InvalidHash(_))));
    }
}
