//! Meta-image extraction from HTML pages.
//!
//! Looks for `og:image`, then `twitter:image`, in either the `property` or
//! the `name` attribute of a `<meta>` tag. Relative URLs are resolved
//! against the page URL.

use scraper::{Html, Selector};
use url::Url;

/// Meta tags consulted, in order.
pub const META_IMAGE_KEYS: [&str; 2] = ["og:image", "twitter:image"];

/// First usable meta-image URL in `html`, made absolute against `base_url`.
pub fn meta_image(html: &str, base_url: &Url) -> Option<String> {
    let document = Html::parse_document(html);

    META_IMAGE_KEYS.iter().find_map(|key| {
        let selector = Selector::parse(&format!(r#"meta[property="{key}"], meta[name="{key}"]"#)).ok()?;
        document
            .select(&selector)
            .filter_map(|element| element.value().attr("content"))
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .find_map(|content| base_url.join(content).ok())
            .map(|url| url.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://site.test/batman/4050-796/").unwrap()
    }

    #[test]
    fn test_og_image() {
        let html = r#"
            <html><head>
                <meta property="og:image" content="https://img.test/cover.jpg">
                <meta name="twitter:image" content="https://img.test/other.jpg">
            </head></html>
        "#;
        assert_eq!(meta_image(html, &base()).as_deref(), Some("https://img.test/cover.jpg"));
    }

    #[test]
    fn test_twitter_fallback() {
        let html = r#"<html><head><meta name="twitter:image" content="https://img.test/tw.jpg"></head></html>"#;
        assert_eq!(meta_image(html, &base()).as_deref(), Some("https://img.test/tw.jpg"));
    }

    #[test]
    fn test_relative_url_resolved() {
        let html = r#"<html><head><meta property="og:image" content="/a/uploads/x.png"></head></html>"#;
        assert_eq!(meta_image(html, &base()).as_deref(), Some("https://site.test/a/uploads/x.png"));
    }

    #[test]
    fn test_empty_content_skipped() {
        let html = r#"
            <html><head>
                <meta property="og:image" content="  ">
                <meta name="twitter:image" content="https://img.test/tw.jpg">
            </head></html>
        "#;
        assert_eq!(meta_image(html, &base()).as_deref(), Some("https://img.test/tw.jpg"));
    }

    #[test]
    fn test_no_meta_image() {
        let html = r#"<html><head><meta name="description" content="x"></head><body><img src="a.jpg"></body></html>"#;
        assert!(meta_image(html, &base()).is_none());
    }
}
