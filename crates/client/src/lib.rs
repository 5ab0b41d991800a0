//! Network side of cvcache.
//!
//! This crate provides the upstream API client, bounded downloads, meta-image
//! extraction, the image resolution pipeline, the passthrough forwarder and
//! the resolver that ties them to the store.

pub mod extract;
pub mod fetch;
pub mod images;
pub mod passthrough;
pub mod resolver;
pub mod upstream;

pub use extract::meta_image;
pub use fetch::{FetchClient, FetchConfig, FetchResponse};
pub use images::{ImagePipeline, ImageSource, ResolvedImage};
pub use passthrough::Passthrough;
pub use resolver::{DATA_SOURCE_HEADER, DataSource, Resolution, Resolver};
pub use upstream::{Miss, UpstreamClient, UpstreamConfig, UpstreamOutcome, UpstreamReply};
