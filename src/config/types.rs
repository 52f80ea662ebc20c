use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Catalog-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "access-policy", default)]
    pub access_policy: AccessPolicyConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

/// Crawl run behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// First listing page; may contain a `{page}` placeholder
    #[serde(rename = "start-url")]
    pub start_url: String,

    /// Query parameter carrying the page index when `start-url` has no placeholder
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Maximum number of listing pages to walk during discovery
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Skip detail fetches for items the store already holds
    #[serde(rename = "skip-existing", default)]
    pub skip_existing: bool,

    /// Consult robots.txt before every fetch
    #[serde(rename = "respect-access-policy", default = "default_true")]
    pub respect_access_policy: bool,

    /// Maximum number of fetches in flight at once
    #[serde(rename = "concurrency-limit")]
    pub concurrency_limit: u32,

    /// Minimum time between two admitted requests (milliseconds)
    #[serde(rename = "min-spacing-ms")]
    pub min_spacing_ms: u64,
}

/// Rolling request budget shared by every fetch
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Window length (milliseconds)
    #[serde(rename = "window-ms")]
    pub window_ms: u64,

    /// Requests admitted per window
    pub capacity: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_ms: 3_600_000,
            capacity: 1000,
        }
    }
}

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Scheduler-level retry policy for transient failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the exponential part of the delay
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the uniformly random jitter added to each delay
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Fetch layer timeouts and transport retries
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Retries for connection-level failures, below the scheduler's retry loop
    #[serde(rename = "transport-retries")]
    pub transport_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            transport_retries: 2,
        }
    }
}

/// robots.txt cache lifetimes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessPolicyConfig {
    #[serde(rename = "cache-ttl-secs")]
    pub cache_ttl_secs: u64,

    /// How long an unreachable robots.txt is remembered before retrying
    #[serde(rename = "failure-ttl-secs")]
    pub failure_ttl_secs: u64,
}

impl Default for AccessPolicyConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 24 * 60 * 60,
            failure_ttl_secs: 600,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Extractor strategy selection
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    /// Built-in strategy name, or "custom" to use `selectors`
    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default)]
    pub selectors: Option<SelectorConfig>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            selectors: None,
        }
    }
}

/// CSS selectors for the "custom" extractor strategy
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Anchors on a listing page that point at detail pages
    #[serde(rename = "listing-item")]
    pub listing_item: String,

    pub title: String,

    /// Additional named fields (field name -> selector)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_true() -> bool {
    true
}

fn default_strategy() -> String {
    "catalog-v2".to_string()
}
