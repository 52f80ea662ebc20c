//! Selector-driven HTML extraction
//!
//! Listing pages yield the `href` of every element matching the strategy's
//! listing-item selector. Detail pages yield a title plus whatever named fields
//! the strategy knows about.

use super::{ExtractionError, Extractor, SelectorStrategy, StructuredRecord};
use crate::url::canonical_id;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// [`Extractor`] backed by `scraper` and a [`SelectorStrategy`]
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    strategy: SelectorStrategy,
}

impl SelectorExtractor {
    pub fn new(strategy: SelectorStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }
}

impl Extractor for SelectorExtractor {
    fn parse_listing(&self, content: &str, page_url: &Url) -> Result<Vec<Url>, ExtractionError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document = Html::parse_document(content);
        let links = document
            .select(&self.strategy.listing_item)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, page_url))
            .collect();

        Ok(links)
    }

    fn parse_detail(&self, content: &str, url: &Url) -> Result<StructuredRecord, ExtractionError> {
        if content.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        let document = Html::parse_document(content);

        let title = select_text(&document, &self.strategy.title)
            .ok_or_else(|| ExtractionError::MissingField("title".to_string()))?;

        let fields: BTreeMap<String, String> = self
            .strategy
            .fields
            .iter()
            .filter_map(|(name, selector)| {
                select_text(&document, selector).map(|value| (name.clone(), value))
            })
            .collect();

        Ok(StructuredRecord {
            canonical_id: canonical_id(url.as_str())?,
            url: url.to_string(),
            title,
            fields,
            strategy: self.strategy.name().to_string(),
        })
    }
}

/// First non-empty value among the matches of `selector`
///
/// Uses the element's collapsed text, falling back to its `content`
/// attribute for `<meta itemprop=...>` style markup.
fn select_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(element_value)
}

fn element_value(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        return Some(text);
    }

    element
        .value()
        .attr("content")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}
