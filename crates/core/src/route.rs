//! Inbound route parsing.
//!
//! Grammar:
//! - detail: `/api/{type}/{prefix}-{id}` (or `/api/{type}/{id}` for types without a prefix)
//! - list: `/api/{plural}`
//! - `/api/chat`: the one singular route without an id
//!
//! A single trailing slash is accepted. Anything else is unparseable and is
//! left for the passthrough forwarder.

use crate::resource::ResourceType;

/// A request path that matched the route grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub resource: ResourceType,
    pub id: Option<i64>,
    pub is_list: bool,
}

impl Route {
    pub fn detail(resource: ResourceType, id: i64) -> Self {
        Self { resource, id: Some(id), is_list: false }
    }

    pub fn list(resource: ResourceType) -> Self {
        Self { resource, id: None, is_list: true }
    }

    /// Upstream path for this route.
    pub fn upstream_path(&self) -> String {
        match self.id {
            Some(id) => self.resource.detail_path(id),
            None if self.is_list => self.resource.list_path(),
            None => format!("/api/{}", self.resource.name()),
        }
    }
}

/// Parse an inbound path. Returns `None` for anything outside the grammar.
pub fn parse(path: &str) -> Option<Route> {
    let rest = path.strip_prefix("/api/")?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }

    let segments: Vec<&str> = rest.split('/').collect();
    match segments.as_slice() {
        ["chat"] => Some(Route { resource: ResourceType::Chat, id: None, is_list: false }),
        [plural] => ResourceType::from_plural(plural).map(Route::list),
        [name, key] => {
            let resource = ResourceType::from_name(name)?;
            let id = parse_key(resource, key)?;
            Some(Route::detail(resource, id))
        }
        _ => None,
    }
}

fn parse_key(resource: ResourceType, key: &str) -> Option<i64> {
    match (resource.prefix(), key.split_once('-')) {
        (Some(prefix), Some((p, id))) => {
            if p.parse::<u32>().ok()? != prefix {
                return None;
            }
            parse_id(id)
        }
        (None, None) => parse_id(key),
        _ => None,
    }
}

fn parse_id(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
