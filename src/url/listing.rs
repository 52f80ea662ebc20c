use crate::UrlError;
use url::Url;

/// Placeholder replaced by the 1-based page index in a listing URL template
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Builds the URL of listing page `page` (1-based)
///
/// With a `{page}` placeholder in `start_url` the index is substituted on every
/// page. Without one, page 1 is `start_url` itself and later pages set the
/// `page_param` query parameter, replacing any existing value.
///
/// # Examples
///
/// ```
/// use catalog_crawler::url::listing_page_url;
///
/// let url = listing_page_url("https://shop.example.com/c/{page}", "page", 3).unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/c/3");
///
/// let url = listing_page_url("https://shop.example.com/c?sort=new", "p", 2).unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/c?sort=new&p=2");
/// ```
pub fn listing_page_url(start_url: &str, page_param: &str, page: u32) -> Result<Url, UrlError> {
    if start_url.contains(PAGE_PLACEHOLDER) {
        let expanded = start_url.replace(PAGE_PLACEHOLDER, &page.to_string());
        return Url::parse(&expanded).map_err(|e| UrlError::Parse(e.to_string()));
    }

    let mut url = Url::parse(start_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    if page <= 1 {
        return Ok(url);
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != page_param)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept.iter())
        .append_pair(page_param, &page.to_string());

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_substituted_on_every_page() {
        let template = "https://example.com/items?page={page}";
        assert_eq!(
            listing_page_url(template, "page", 1).unwrap().as_str(),
            "https://example.com/items?page=1"
        );
        assert_eq!(
            listing_page_url(template, "page", 12).unwrap().as_str(),
            "https://example.com/items?page=12"
        );
    }

    #[test]
    fn test_first_page_is_start_url() {
        let url = listing_page_url("https://example.com/items", "page", 1).unwrap();
        assert_eq!(url.as_str(), "https://example.com/items");
    }

    #[test]
    fn test_later_pages_append_param() {
        let url = listing_page_url("https://example.com/items", "page", 2).unwrap();
        assert_eq!(url.as_str(), "https://example.com/items?page=2");
    }

    #[test]
    fn test_existing_page_param_replaced() {
        let url = listing_page_url("https://example.com/items?page=1&cat=7", "page", 4).unwrap();
        assert_eq!(url.as_str(), "https://example.com/items?cat=7&page=4");
    }

    #[test]
    fn test_invalid_template() {
        assert!(listing_page_url("not a url {page}", "page", 1).is_err());
    }
}
