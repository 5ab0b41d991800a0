//! SQLite-backed storage for the proxy.
//!
//! One database holds three things:
//!
//! - Structured Store: one `cv_{type}` table of JSON documents per resource type
//! - Legacy response cache from earlier releases (read-only)
//! - Image Store: content-addressed binaries keyed by SHA-256 of the source URL
//!
//! Access goes through tokio-rusqlite, so every statement runs on the
//! connection's background thread and autocommits.

pub mod connection;
pub mod hash;
pub mod images;
pub mod legacy;
pub mod migrations;
pub mod query;
pub mod records;

pub use crate::Error;

pub use connection::CatalogDb;
pub use hash::{content_hash, is_content_hash};
pub use images::ImageAsset;
pub use legacy::LegacyResponse;
pub use query::{Filter, MAX_LIMIT, Page, QuerySpec, Sort, SortDirection};
