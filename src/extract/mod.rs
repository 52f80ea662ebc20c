//! Turning raw page content into item URLs and structured records
//!
//! The orchestrator only sees the [`Extractor`] trait. The shipped
//! implementation is [`SelectorExtractor`], driven by a [`SelectorStrategy`]
//! picked by name from configuration.

mod html;
mod strategy;

pub use html::{resolve_link, SelectorExtractor};
pub use strategy::{SelectorStrategy, StrategyError, BUILTIN_STRATEGIES, CUSTOM_STRATEGY};

use crate::UrlError;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// A normalized item ready for persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRecord {
    /// Deduplication key, see [`crate::url::canonical_id`]
    pub canonical_id: String,

    /// URL the record was extracted from
    pub url: String,

    pub title: String,

    /// Named fields found on the page (absent fields are omitted)
    pub fields: BTreeMap<String, String>,

    /// Name of the strategy that produced the record
    pub strategy: String,
}

/// Why a page could not be turned into a record
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Required field '{0}' not found")]
    MissingField(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Page content is empty")]
    Empty,

    #[error("Item URL has no canonical form: {0}")]
    InvalidUrl(#[from] UrlError),
}

/// Stateless parser for listing and detail pages
///
/// Implementations must not perform network or storage side effects.
pub trait Extractor: Send + Sync {
    /// Returns the item URLs found on a listing page, resolved against `page_url`
    ///
    /// An empty vector means the catalog has no more items.
    fn parse_listing(&self, content: &str, page_url: &Url) -> Result<Vec<Url>, ExtractionError>;

    /// Builds a record from a detail page
    fn parse_detail(&self, content: &str, url: &Url) -> Result<StructuredRecord, ExtractionError>;
}
