//! cvcache server entry point.
//!
//! Boots the read-through proxy over HTTP. Logs are JSON on stdout,
//! filtered through `RUST_LOG`.

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use cvcache_client::Resolver;
use cvcache_core::{AppConfig, CatalogDb};

mod app;
mod error;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::load()?;
    let db = CatalogDb::open(&config.db_path).await?;
    let resolver = Resolver::new(&config, db)?;

    if !resolver.has_credential() {
        tracing::warn!("no upstream API key configured; misses will be forwarded as-is");
    }

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        db = %config.db_path.display(),
        upstream = %config.upstream_base_url,
        "starting cvcache"
    );

    let app = app::router(Arc::new(app::AppState { resolver }));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
