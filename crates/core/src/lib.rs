//! Core types and storage for cvcache.
//!
//! This crate provides:
//! - Resource-type tables and the route parser
//! - The document normalizer
//! - SQLite store, legacy cache reader, image store and query engine
//! - Unified error types and configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod normalize;
pub mod resource;
pub mod route;

pub use cache::{CatalogDb, ImageAsset, Page, QuerySpec};
pub use config::AppConfig;
pub use error::Error;
pub use resource::ResourceType;
pub use route::Route;
