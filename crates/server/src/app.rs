//! Axum app: state, router, and handlers.
//!
//! `GET /api/*` goes to the resolver; `/images/:hash` serves cached binaries
//! straight from the image store. `/health` and `/` only report presence.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use cvcache_client::{Resolution, Resolver};
use cvcache_core::cache::is_content_hash;

use crate::error::ProxyError;

const DATA_SOURCE: HeaderName = HeaderName::from_static("x-data-source");

/// Shared state handed to every handler.
pub(crate) struct AppState {
    pub(crate) resolver: Resolver,
}

/// Builds the router with permissive CORS.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/*path", get(api))
        .route("/images/:hash", get(image))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn resolution_response(resolution: Resolution) -> Response {
    let status = StatusCode::from_u16(resolution.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, resolution.body).into_response();
    let headers = response.headers_mut();
    if let Ok(content_type) = HeaderValue::from_str(&resolution.content_type) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(DATA_SOURCE, HeaderValue::from_static(resolution.source.as_str()));
    response
}

/// GET /api/*
async fn api(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let params = query_pairs(uri.query());
    let resolution = state.resolver.resolve(uri.path(), &params).await;
    tracing::info!(
        path = uri.path(),
        status = resolution.status,
        source = resolution.source.as_str(),
        "request resolved"
    );
    resolution_response(resolution)
}

/// GET /images/:hash
async fn image(State(state): State<Arc<AppState>>, Path(hash): Path<String>) -> Result<Response, ProxyError> {
    if !is_content_hash(&hash) {
        return Err(ProxyError::NotFound(hash));
    }

    let asset = state
        .resolver
        .db()
        .get_image(&hash)
        .await?
        .ok_or(ProxyError::NotFound(hash))?;

    let content_type = HeaderValue::from_str(&asset.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], asset.bytes).into_response())
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = match state.resolver.db().ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the store");
            "unavailable"
        }
    };
    let api_key = if state.resolver.has_credential() { "configured" } else { "missing" };

    Json(json!({ "status": "ok", "database": database, "api_key": api_key }))
}

/// GET /
async fn index() -> Json<Value> {
    Json(json!({
        "service": "cvcache",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/api/*": "ComicVine API, served read-through from the local catalog",
            "/images/{hash}": "Cached image binaries",
            "/health": "Health check",
        },
    }))
}

async fn not_found(uri: Uri) -> ProxyError {
    ProxyError::NotFound(uri.path().to_string())
}
