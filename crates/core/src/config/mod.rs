//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CVCACHE_*)
//! 2. TOML config file (if CVCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is constructed once at startup and handed to the
//! resolver; nothing reads configuration from ambient globals afterwards.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CVCACHE_*)
/// 2. TOML config file (if CVCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server-held upstream API credential.
    ///
    /// Set via CVCACHE_API_KEY (or COMICVINE_API_KEY). Without it the
    /// resolver never calls the upstream API itself and only forwards.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the upstream API.
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// Base URL of the public site whose detail pages are scraped for images.
    #[serde(default = "default_upstream_base_url")]
    pub site_base_url: String,

    /// Path to the SQLite store.
    ///
    /// Set via CVCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// User-Agent string for outbound HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for every outbound call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted for a downloaded image or scraped page.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// Number of leading list items that get image enrichment per request.
    #[serde(default = "default_list_enrichment_cap")]
    pub list_enrichment_cap: usize,

    /// Public base URL of this service. When set, image URLs whose binaries
    /// are cached locally are rewritten to `{public_url}/images/{hash}`.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Publisher names a volume listing is restricted to. Empty disables
    /// the restriction.
    ///
    /// Set via CVCACHE_MAJOR_PUBLISHERS (`["Marvel", "DC Comics"]`) or the TOML file.
    #[serde(default)]
    pub major_publishers: Vec<String>,
}

fn default_upstream_base_url() -> String {
    "https://comicvine.gamespot.com".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cvcache.sqlite")
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

fn default_user_agent() -> String {
    "cvcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_list_enrichment_cap() -> usize {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            upstream_base_url: default_upstream_base_url(),
            site_base_url: default_upstream_base_url(),
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_image_bytes: default_max_image_bytes(),
            list_enrichment_cap: default_list_enrichment_cap(),
            public_url: None,
            major_publishers: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port` listen address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CVCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        if let Ok(key) = std::env::var("COMICVINE_API_KEY")
            && !key.is_empty()
        {
            figment = figment.merge(Serialized::default("api_key", key));
        }

        figment = figment.merge(
            Env::prefixed("CVCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let mut config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.api_key = config.api_key.filter(|k| !k.is_empty());

        config.validate()?;

        Ok(config)
    }
}
