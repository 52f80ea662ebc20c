//! URL handling module for Catalog-Crawler
//!
//! This module provides URL normalization, canonical item identifiers, host
//! extraction and listing page URL construction.

mod host;
mod listing;
mod normalize;

use crate::UrlError;

// Re-export main functions
pub use host::{extract_host, robots_url};
pub use listing::{listing_page_url, PAGE_PLACEHOLDER};
pub use normalize::normalize_url;

/// Derives the stable identifier used for deduplication and upserts
///
/// The identifier is the normalized URL without its scheme, so an item reached
/// over `http` and `https`, with or without tracking parameters, maps to the
/// same key.
///
/// # Examples
///
/// ```
/// use catalog_crawler::url::canonical_id;
///
/// let a = canonical_id("https://www.example.com/item/42/?utm_source=mail").unwrap();
/// let b = canonical_id("http://example.com/item/42#specs").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a, "example.com/item/42");
/// ```
pub fn canonical_id(url_str: &str) -> Result<String, UrlError> {
    let normalized = normalize_url(url_str)?;
    let host = extract_host(&normalized).ok_or(UrlError::MissingDomain)?;

    let mut id = format!("{}{}", host, normalized.path());
    if let Some(query) = normalized.query() {
        id.push('?');
        id.push_str(query);
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_id_ignores_scheme() {
        assert_eq!(
            canonical_id("http://example.com/item/1").unwrap(),
            canonical_id("https://example.com/item/1").unwrap()
        );
    }

    #[test]
    fn test_canonical_id_keeps_identifying_query() {
        let id = canonical_id("https://example.com/product?sku=B-22&utm_campaign=x").unwrap();
        assert_eq!(id, "example.com/product?sku=B-22");
    }

    #[test]
    fn test_canonical_id_keeps_port() {
        let id = canonical_id("http://127.0.0.1:4545/item/9").unwrap();
        assert_eq!(id, "127.0.0.1:4545/item/9");
    }

    #[test]
    fn test_canonical_id_distinguishes_items() {
        assert_ne!(
            canonical_id("https://example.com/item/1").unwrap(),
            canonical_id("https://example.com/item/2").unwrap()
        );
    }

    #[test]
    fn test_canonical_id_rejects_non_http() {
        assert!(canonical_id("mailto:someone@example.com").is_err());
    }
}
