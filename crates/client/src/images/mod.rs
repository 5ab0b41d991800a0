//! Image resolution pipeline.
//!
//! Tiers, each tried only when the previous one found nothing:
//!
//! 1. **Embedded**: the document's own `image` already has a usable URL.
//! 2. **RelatedCover** (volumes only): the cover of the volume's lowest
//!    numbered issue. The issue is resolved through tiers 1, 3 and 4 and
//!    never recurses back into a volume.
//! 3. **NarrowUpstream**: re-fetch only `id,name,image` for (type, id).
//! 4. **Scrape**: read `og:image`/`twitter:image` from the public detail page.
//!
//! A hit from tiers 2 to 4 downloads the binary once into the image store
//! and writes the URLs back into the stored record, so the next read stops
//! at tier 1. Total failure leaves the document as it was.

pub mod page;

use serde_json::{Value, json};

use cvcache_core::cache::{ImageAsset, content_hash};
use cvcache_core::normalize::{ImageSet, document_id, is_usable_image_url, normalize, rewrite_image_url};
use cvcache_core::{CatalogDb, ResourceType, Route};

use crate::extract::meta_image;
use crate::fetch::{ACCEPT_HTML, ACCEPT_IMAGE, FetchClient};
use crate::upstream::{UpstreamClient, UpstreamOutcome};

/// Which tier produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Embedded,
    RelatedCover,
    NarrowUpstream,
    Scrape,
}

#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub image: ImageSet,
    pub source: ImageSource,
}

impl ResolvedImage {
    fn new(image: ImageSet, source: ImageSource) -> Self {
        Self { image, source }
    }
}

/// Multi-tier image lookup and caching.
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    db: CatalogDb,
    upstream: UpstreamClient,
    fetch: FetchClient,
    site_base_url: String,
    public_url: Option<String>,
}

/// A usable image already on the document.
fn embedded(doc: &Value) -> Option<ImageSet> {
    ImageSet::from_value(doc.get("image")).filter(ImageSet::is_valid)
}

/// Id of a relation stored either as a bare id or as `{id}`.
fn relation_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        other => document_id(other),
    }
}

/// Id of the volume's lowest numbered issue, else its `first_issue`.
fn first_issue_id(volume: &Value) -> Option<i64> {
    let lowest = volume
        .get("issues")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|issue| {
            let number = match issue.get("issue_number")? {
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                Value::Number(n) => n.as_f64()?,
                _ => return None,
            };
            Some((number, relation_id(issue)?))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id);

    lowest.or_else(|| volume.get("first_issue").and_then(relation_id))
}

impl ImagePipeline {
    pub fn new(
        db: CatalogDb, upstream: UpstreamClient, fetch: FetchClient, site_base_url: String, public_url: Option<String>,
    ) -> Self {
        Self { db, upstream, fetch, site_base_url, public_url }
    }

    /// Make sure `doc.image` carries a usable URL.
    ///
    /// Returns the document with the resolved image, or unchanged when no
    /// tier finds one. Non-object documents are returned untouched.
    pub async fn ensure_image(&self, resource: ResourceType, id: i64, mut doc: Value) -> Value {
        if !doc.is_object() {
            return doc;
        }

        let Some(resolved) = self.locate(resource, id, &doc).await else {
            tracing::debug!(%resource, id, "no image found in any tier");
            return doc;
        };

        if resolved.source != ImageSource::Embedded {
            tracing::info!(%resource, id, source = ?resolved.source, "resolved image");
            self.commit(resource, id, &resolved.image).await;
            doc["image"] = resolved.image.to_value();
        }

        doc
    }

    /// Walk the tiers for one document.
    pub async fn locate(&self, resource: ResourceType, id: i64, doc: &Value) -> Option<ResolvedImage> {
        if let Some(image) = embedded(doc) {
            return Some(ResolvedImage::new(image, ImageSource::Embedded));
        }

        if resource == ResourceType::Volume
            && let Some(image) = self.related_cover(doc).await
        {
            return Some(ResolvedImage::new(image, ImageSource::RelatedCover));
        }

        self.locate_remote(resource, id, doc).await
    }

    /// Tiers 3 and 4.
    async fn locate_remote(&self, resource: ResourceType, id: i64, doc: &Value) -> Option<ResolvedImage> {
        if let Some(image) = self.narrow_upstream(resource, id).await {
            return Some(ResolvedImage::new(image, ImageSource::NarrowUpstream));
        }

        self.scrape(resource, id, doc)
            .await
            .map(|image| ResolvedImage::new(image, ImageSource::Scrape))
    }

    async fn related_cover(&self, volume: &Value) -> Option<ImageSet> {
        let issue_id = first_issue_id(volume)?;

        let issue = match self.db.get_record(ResourceType::Issue, issue_id).await {
            Ok(Some(doc)) => normalize(ResourceType::Issue, doc),
            Ok(None) => json!({ "id": issue_id }),
            Err(e) => {
                tracing::warn!(issue_id, error = %e, "issue lookup failed, using stub");
                json!({ "id": issue_id })
            }
        };

        if let Some(image) = embedded(&issue) {
            return Some(image);
        }

        let resolved = self.locate_remote(ResourceType::Issue, issue_id, &issue).await?;
        self.commit(ResourceType::Issue, issue_id, &resolved.image).await;
        Some(resolved.image)
    }

    async fn narrow_upstream(&self, resource: ResourceType, id: i64) -> Option<ImageSet> {
        let params = [("field_list".to_string(), "id,name,image".to_string())];
        match self.upstream.fetch(&Route::detail(resource, id), &params).await {
            UpstreamOutcome::Document(envelope) => envelope.get("results").and_then(embedded),
            UpstreamOutcome::Miss(_) => None,
        }
    }

    async fn scrape(&self, resource: ResourceType, id: i64, doc: &Value) -> Option<ImageSet> {
        let page_url = page::detail_page_url(&self.site_base_url, resource, id, doc)?;

        let page = match self.fetch.fetch(&page_url, ACCEPT_HTML).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!(%resource, id, url = %page_url, error = %e, "detail page fetch failed");
                return None;
            }
        };

        meta_image(&page.text(), &page.final_url)
            .filter(|url| is_usable_image_url(url))
            .map(|url| ImageSet::from_url(&url))
    }

    /// Cache the binary and write the URLs into the stored record.
    ///
    /// Both steps are best effort: a failed download still records the URL.
    async fn commit(&self, resource: ResourceType, id: i64, image: &ImageSet) {
        if let Some(url) = image.primary_url() {
            self.store_binary(url).await;
        }

        match self.db.update_record_image(resource, id, &image.to_value()).await {
            Ok(true) => tracing::debug!(%resource, id, "image written back to record"),
            Ok(false) => tracing::debug!(%resource, id, "no stored record to enrich"),
            Err(e) => tracing::warn!(%resource, id, error = %e, "image write-back failed"),
        }
    }

    async fn store_binary(&self, url: &str) {
        let hash = match content_hash(url) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::debug!(url, error = %e, "image URL cannot be hashed");
                return;
            }
        };

        if matches!(self.db.has_image(&hash).await, Ok(true)) {
            return;
        }

        let response = match self.fetch.fetch(url, ACCEPT_IMAGE).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "image download failed");
                return;
            }
        };

        let stored = ImageAsset::new(url, response.content_type, response.bytes.to_vec());
        match stored {
            Ok(asset) => match self.db.put_image(&asset).await {
                Ok(true) => tracing::info!(url, hash = %asset.hash, bytes = asset.bytes.len(), "cached image"),
                Ok(false) => tracing::debug!(url, hash = %asset.hash, "image already cached"),
                Err(e) => tracing::warn!(url, error = %e, "image store write failed"),
            },
            Err(e) => tracing::warn!(url, error = %e, "image asset rejected"),
        }
    }

    /// Point the document's cached image URL at this service.
    ///
    /// No-op unless a public URL is configured and the binary is stored.
    pub async fn localize(&self, doc: &mut Value) {
        let Some(public_url) = self.public_url.as_deref() else {
            return;
        };
        let Some(url) = ImageSet::from_value(doc.get("image")).and_then(|i| i.primary_url().map(String::from)) else {
            return;
        };
        let Ok(hash) = content_hash(&url) else {
            return;
        };

        if matches!(self.db.has_image(&hash).await, Ok(true)) {
            let local = format!("{}/images/{hash}", public_url.trim_end_matches('/'));
            rewrite_image_url(doc, &url, &local);
        }
    }
}
