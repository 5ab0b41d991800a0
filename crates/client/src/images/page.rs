//! Public detail-page URLs used by the scrape tier.

use cvcache_core::ResourceType;
use serde_json::Value;

/// Lowercase ASCII slug: runs of anything but letters and digits become one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Slug segment of a document's own `site_detail_url`, e.g. `batman` in
/// `https://site/batman/4050-796/`.
fn slug_from_detail_url(detail_url: &str) -> Option<String> {
    let url = url::Url::parse(detail_url).ok()?;
    let slug = url.path_segments()?.find(|s| !s.is_empty())?;
    let slug = slugify(slug);
    (!slug.is_empty()).then_some(slug)
}

/// `{site_base}/{slug}/{prefix}-{id}/` for a document.
///
/// Returns `None` for types without a prefix and for documents with neither
/// a `site_detail_url` nor a non-empty `name`.
pub fn detail_page_url(site_base: &str, resource: ResourceType, id: i64, doc: &Value) -> Option<String> {
    let prefix = resource.prefix()?;

    let slug = doc
        .get("site_detail_url")
        .and_then(Value::as_str)
        .and_then(slug_from_detail_url)
        .or_else(|| {
            let name = doc.get("name").and_then(Value::as_str)?;
            let slug = slugify(name);
            (!slug.is_empty()).then_some(slug)
        })?;

    Some(format!("{}/{slug}/{prefix}-{id}/", site_base.trim_end_matches('/')))
}
