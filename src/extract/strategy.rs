use crate::config::{ExtractorConfig, SelectorConfig};
use scraper::Selector;
use thiserror::Error;

/// Strategy name that takes its selectors from `[extractor.selectors]`
pub const CUSTOM_STRATEGY: &str = "custom";

/// Names of the strategies shipped with the crate, oldest layout first
pub const BUILTIN_STRATEGIES: &[&str] = &["catalog-v1", "catalog-v2", "catalog-v3"];

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{0}' (expected one of catalog-v1, catalog-v2, catalog-v3, custom)")]
    Unknown(String),

    #[error("strategy 'custom' requires an [extractor.selectors] table")]
    MissingSelectors,

    #[error("invalid selector '{selector}' for {role}")]
    InvalidSelector { role: String, selector: String },
}

/// Compiled selectors for one catalog page layout
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    name: String,
    pub(crate) listing_item: Selector,
    pub(crate) title: Selector,
    pub(crate) fields: Vec<(String, Selector)>,
}

impl SelectorStrategy {
    /// Resolves the configured strategy and compiles its selectors
    ///
    /// Built-in strategies ignore `selectors`; `custom` requires it.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, StrategyError> {
        let name = config.strategy.trim();

        if name == CUSTOM_STRATEGY {
            let selectors = config
                .selectors
                .as_ref()
                .ok_or(StrategyError::MissingSelectors)?;
            return Self::from_selectors(CUSTOM_STRATEGY, selectors);
        }

        Self::builtin(name)
    }

    /// Looks up a built-in strategy by name
    pub fn builtin(name: &str) -> Result<Self, StrategyError> {
        let (listing_item, title, fields): (&str, &str, Vec<(&str, &str)>) = match name {
            // Table-based layout
            "catalog-v1" => (
                "table.catalog td a[href]",
                "h1",
                vec![("price", "td.price"), ("description", "div.description")],
            ),
            // Card layout with item-link anchors
            "catalog-v2" => (
                "a.item-link[href]",
                "h1",
                vec![
                    ("price", ".price"),
                    ("sku", ".sku"),
                    ("description", ".description"),
                ],
            ),
            // schema.org microdata
            "catalog-v3" => (
                "article[data-item] a[href]",
                "[itemprop=name]",
                vec![
                    ("price", "[itemprop=price]"),
                    ("sku", "[itemprop=sku]"),
                    ("brand", "[itemprop=brand]"),
                    ("description", "[itemprop=description]"),
                ],
            ),
            other => return Err(StrategyError::Unknown(other.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            listing_item: compile("listing-item", listing_item)?,
            title: compile("title", title)?,
            fields: compile_fields(fields.into_iter())?,
        })
    }

    fn from_selectors(name: &str, selectors: &SelectorConfig) -> Result<Self, StrategyError> {
        Ok(Self {
            name: name.to_string(),
            listing_item: compile("listing-item", &selectors.listing_item)?,
            title: compile("title", &selectors.title)?,
            fields: compile_fields(
                selectors
                    .fields
                    .iter()
                    .map(|(field, css)| (field.as_str(), css.as_str())),
            )?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn compile(role: &str, css: &str) -> Result<Selector, StrategyError> {
    Selector::parse(css).map_err(|_| StrategyError::InvalidSelector {
        role: role.to_string(),
        selector: css.to_string(),
    })
}

fn compile_fields<'a>(
    fields: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<(String, Selector)>, StrategyError> {
    let mut compiled = Vec::new();
    for (field, css) in fields {
        compiled.push((field.to_string(), compile(field, css)?));
    }
    Ok(compiled)
}
