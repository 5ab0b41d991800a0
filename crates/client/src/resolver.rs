//! Resource resolver: the read-through cache.
//!
//! Detail requests walk `store -> legacy cache -> upstream -> passthrough`;
//! list requests walk `query engine -> upstream list -> passthrough`.
//! Unparseable paths go straight to passthrough. Each request makes at
//! most one upstream detail/list call; image enrichment may add narrow
//! calls on top.

use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;

use cvcache_core::cache::{Page, QuerySpec};
use cvcache_core::normalize::{document_id, normalize, project};
use cvcache_core::route::{self, Route};
use cvcache_core::{AppConfig, CatalogDb, Error, ResourceType};

use crate::fetch::{FetchClient, FetchConfig};
use crate::images::ImagePipeline;
use crate::passthrough::Passthrough;
use crate::upstream::{Miss, UpstreamClient, UpstreamConfig, UpstreamOutcome, UpstreamReply};

/// Response header naming the tier that answered.
pub const DATA_SOURCE_HEADER: &str = "X-Data-Source";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Tier that produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    LocalDatabaseTable,
    LegacyCache,
    ComicvineApi,
    Passthrough,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::LocalDatabaseTable => "local_database_table",
            DataSource::LegacyCache => "legacy_cache",
            DataSource::ComicvineApi => "comicvine_api",
            DataSource::Passthrough => "passthrough",
        }
    }
}

/// A finished response, ready to be written by the HTTP layer.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
    pub source: DataSource,
}

impl Resolution {
    fn json(status: u16, value: &Value, source: DataSource) -> Self {
        Self {
            status,
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: Bytes::from(value.to_string()),
            source,
        }
    }

    fn relay(reply: UpstreamReply) -> Self {
        Self {
            status: reply.status,
            content_type: reply.content_type.unwrap_or_else(|| JSON_CONTENT_TYPE.to_string()),
            body: reply.body,
            source: DataSource::Passthrough,
        }
    }

    /// Structured error once every tier is exhausted.
    fn failure(status: u16, message: &str) -> Self {
        let body = json!({ "status_code": 0, "error": message, "results": [] });
        Self::json(status, &body, DataSource::Passthrough)
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

fn detail_envelope(results: Value) -> Value {
    json!({
        "error": "OK",
        "limit": 1,
        "offset": 0,
        "number_of_page_results": 1,
        "number_of_total_results": 1,
        "status_code": 1,
        "results": results,
        "version": "1.0",
    })
}

fn list_envelope(results: Vec<Value>, spec: &QuerySpec, total: u64) -> Value {
    json!({
        "error": "OK",
        "limit": spec.limit,
        "offset": spec.offset,
        "number_of_page_results": results.len(),
        "number_of_total_results": total,
        "status_code": 1,
        "results": results,
        "version": "1.0",
    })
}

/// Upstream envelope with `results` swapped for our rendition.
fn mirror(mut envelope: Value, results: Value) -> Value {
    if let Some(map) = envelope.as_object_mut() {
        map.insert("results".to_string(), results);
    }
    envelope
}

/// Keys requested through `field_list`. Empty means all.
fn field_list(params: &[(String, String)]) -> Vec<String> {
    params
        .iter()
        .filter(|(k, _)| k == "field_list")
        .flat_map(|(_, v)| v.split(','))
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}

fn without_field_list(params: &[(String, String)]) -> Vec<(String, String)> {
    params.iter().filter(|(k, _)| k != "field_list").cloned().collect()
}

#[derive(Debug, Clone)]
struct ResolverConfig {
    list_enrichment_cap: usize,
    major_publishers: Vec<String>,
}

/// Orchestrates the store, upstream client, image pipeline and passthrough.
#[derive(Debug, Clone)]
pub struct Resolver {
    db: CatalogDb,
    upstream: UpstreamClient,
    passthrough: Passthrough,
    images: ImagePipeline,
    config: Arc<ResolverConfig>,
}

impl Resolver {
    /// Build a resolver and its HTTP clients from the loaded configuration.
    pub fn new(config: &AppConfig, db: CatalogDb) -> Result<Self, Error> {
        let upstream_config = UpstreamConfig::from(config);
        let upstream = UpstreamClient::new(upstream_config.clone())?;
        let passthrough = Passthrough::new(upstream_config)?;
        let fetch = FetchClient::new(FetchConfig::from(config))?;
        let images = ImagePipeline::new(
            db.clone(),
            upstream.clone(),
            fetch,
            config.site_base_url.clone(),
            config.public_url.clone(),
        );

        Ok(Self {
            db,
            upstream,
            passthrough,
            images,
            config: Arc::new(ResolverConfig {
                list_enrichment_cap: config.list_enrichment_cap,
                major_publishers: config.major_publishers.clone(),
            }),
        })
    }

    pub fn db(&self) -> &CatalogDb {
        &self.db
    }

    pub fn has_credential(&self) -> bool {
        self.upstream.has_credential()
    }

    /// Resolve one inbound `/api/...` request.
    pub async fn resolve(&self, path: &str, params: &[(String, String)]) -> Resolution {
        let Some(route) = route::parse(path) else {
            tracing::debug!(path, "route not recognized, forwarding");
            return self.forward(path, params).await;
        };

        match route.id {
            Some(id) => self.resolve_detail(route, id, path, params).await,
            None if route.is_list => self.resolve_list(route, path, params).await,
            None => self.resolve_singular(route, path, params).await,
        }
    }

    async fn resolve_detail(&self, route: Route, id: i64, path: &str, params: &[(String, String)]) -> Resolution {
        let resource = route.resource;
        let fields = field_list(params);

        match self.db.get_record(resource, id).await {
            Ok(Some(doc)) => {
                tracing::debug!(%resource, id, "store hit");
                let doc = self.present(resource, Some(id), doc, &fields, true).await;
                return Resolution::json(200, &detail_envelope(doc), DataSource::LocalDatabaseTable);
            }
            Ok(None) => tracing::debug!(%resource, id, "store miss"),
            Err(e) => tracing::warn!(%resource, id, error = %e, "store unavailable, degrading"),
        }

        match self.db.get_legacy(resource, id).await {
            Ok(Some(cached)) => match cached.document().cloned() {
                Some(results) => {
                    tracing::debug!(%resource, id, "legacy cache hit");
                    let doc = self.present(resource, Some(id), results, &fields, true).await;
                    return Resolution::json(200, &mirror(cached.envelope, doc), DataSource::LegacyCache);
                }
                None => tracing::debug!(%resource, id, "legacy cache holds no document, treating as miss"),
            },
            Ok(None) => tracing::debug!(%resource, id, "legacy cache miss"),
            Err(e) => tracing::warn!(%resource, id, error = %e, "legacy cache unavailable, degrading"),
        }

        let envelope = match self.upstream.fetch(&route, &without_field_list(params)).await {
            UpstreamOutcome::Document(envelope) => envelope,
            UpstreamOutcome::Miss(miss) => return self.after_miss(miss, path, params).await,
        };

        let results = envelope.get("results").cloned().unwrap_or(Value::Null);
        if !results.is_object() {
            tracing::warn!(%resource, id, "upstream results are not a document, passing through");
            return Resolution::json(200, &envelope, DataSource::ComicvineApi);
        }

        let key = match self.db.upsert_record(resource, id, &results).await {
            Ok(key) => {
                tracing::info!(%resource, id = key, "persisted upstream document");
                key
            }
            Err(e) => {
                tracing::warn!(%resource, id, error = %e, "could not persist upstream document");
                id
            }
        };

        let doc = self.present(resource, Some(key), results, &fields, true).await;
        Resolution::json(200, &mirror(envelope, doc), DataSource::ComicvineApi)
    }

    async fn resolve_list(&self, route: Route, path: &str, params: &[(String, String)]) -> Resolution {
        let resource = route.resource;
        let fields = field_list(params);

        match QuerySpec::from_params(resource, params) {
            Ok(spec) => {
                let spec = spec.with_publishers(&self.config.major_publishers);
                match self.local_page(&spec).await {
                    Ok(Some(page)) => {
                        tracing::debug!(%resource, total = page.total, items = page.items.len(), "query engine hit");
                        let mut items = Vec::with_capacity(page.items.len());
                        for (i, item) in page.items.into_iter().enumerate() {
                            let id = document_id(&item);
                            let enrich = i < self.config.list_enrichment_cap;
                            items.push(self.present(resource, id, item, &fields, enrich).await);
                        }
                        let body = list_envelope(items, &spec, page.total);
                        return Resolution::json(200, &body, DataSource::LocalDatabaseTable);
                    }
                    Ok(None) => tracing::debug!(%resource, "query engine miss"),
                    Err(e) => tracing::warn!(%resource, error = %e, "query engine unavailable, degrading"),
                }
            }
            Err(e) => tracing::debug!(%resource, error = %e, "query not answerable locally"),
        }

        let envelope = match self.upstream.fetch(&route, params).await {
            UpstreamOutcome::Document(envelope) => envelope,
            UpstreamOutcome::Miss(miss) => return self.after_miss(miss, path, params).await,
        };

        let results = match envelope.get("results") {
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.present(resource, None, item.clone(), &fields, false).await);
                }
                Value::Array(out)
            }
            _ => return Resolution::json(200, &envelope, DataSource::ComicvineApi),
        };

        Resolution::json(200, &mirror(envelope, results), DataSource::ComicvineApi)
    }

    /// `/api/chat`: no id and no local table lookup.
    async fn resolve_singular(&self, route: Route, path: &str, params: &[(String, String)]) -> Resolution {
        match self.upstream.fetch(&route, params).await {
            UpstreamOutcome::Document(envelope) => Resolution::json(200, &envelope, DataSource::ComicvineApi),
            UpstreamOutcome::Miss(miss) => self.after_miss(miss, path, params).await,
        }
    }

    /// A page only counts when the table exists and something matched.
    async fn local_page(&self, spec: &QuerySpec) -> Result<Option<Page>, Error> {
        if !self.db.has_table(spec.resource).await? {
            return Ok(None);
        }
        let page = self.db.query(spec).await?;
        Ok((page.total > 0).then_some(page))
    }

    /// Passthrough state after the one upstream call came back empty.
    async fn after_miss(&self, miss: Miss, path: &str, params: &[(String, String)]) -> Resolution {
        match miss {
            Miss::NoCredential => self.forward(path, params).await,
            Miss::Rejected(reply) => {
                tracing::debug!(path, status = reply.status, "relaying upstream reply");
                Resolution::relay(reply)
            }
            Miss::Unreachable(message) => Resolution::failure(500, &message),
        }
    }

    async fn forward(&self, path: &str, params: &[(String, String)]) -> Resolution {
        match self.passthrough.forward(path, params).await {
            Ok(reply) => Resolution::relay(reply),
            Err(e) => {
                tracing::warn!(path, error = %e, "passthrough failed");
                Resolution::failure(500, &e.to_string())
            }
        }
    }

    /// Normalize, optionally image-ensure, localize image URLs, then project.
    async fn present(
        &self, resource: ResourceType, id: Option<i64>, doc: Value, fields: &[String], enrich: bool,
    ) -> Value {
        let mut doc = normalize(resource, doc);
        if enrich && let Some(id) = id {
            doc = self.images.ensure_image(resource, id, doc).await;
        }
        self.images.localize(&mut doc).await;
        project(doc, fields)
    }
}
