//! Robots.txt handling module
//!
//! [`AccessPolicy`] answers "may I fetch this URL?" and "how long should I
//! wait between requests to this host?". Rule sets are fetched lazily per
//! host, cached with a TTL, and never turn a fetch failure into a denial.

mod cache;
mod parser;
mod pattern;

pub use cache::{CachedRules, RulesDocument};
pub use parser::{AccessRuleSet, RuleGroup};
pub use pattern::PathPattern;

use crate::config::AccessPolicyConfig;
use crate::crawler::{CrawlTarget, FetchError, Scheduler};
use crate::url::{extract_host, robots_url};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Cache entry for one host; empty until its robots.txt has been fetched
type HostEntry = Arc<Mutex<Option<CachedRules>>>;

/// Access Policy Checker
///
/// Each host has its own entry lock, held while its robots.txt is fetched:
/// concurrent checks against the same host trigger a single request, and
/// lookups for other hosts do not wait on it.
pub struct AccessPolicy {
    scheduler: Arc<Scheduler>,
    user_agent: String,
    enabled: bool,
    cache_ttl: Duration,
    failure_ttl: Duration,
    hosts: Mutex<HashMap<String, HostEntry>>,
}

impl AccessPolicy {
    /// Creates a checker
    ///
    /// # Arguments
    ///
    /// * `scheduler` - Admits robots.txt requests under the run's quota and spacing
    /// * `user_agent` - Agent token matched against `User-agent` groups
    /// * `config` - Cache lifetimes
    /// * `enabled` - When false every URL is allowed and nothing is fetched
    pub fn new(
        scheduler: Arc<Scheduler>,
        user_agent: impl Into<String>,
        config: &AccessPolicyConfig,
        enabled: bool,
    ) -> Self {
        Self {
            scheduler,
            user_agent: user_agent.into(),
            enabled,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            failure_ttl: Duration::from_secs(config.failure_ttl_secs),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks if a URL may be fetched
    ///
    /// Never fails: an unreachable robots.txt allows the URL and logs a warning.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }

        let Some(host) = extract_host(url) else {
            return true;
        };

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let entry = self.entry(&host).await;
        let mut rules = entry.lock().await;

        let needs_refresh = rules
            .as_ref()
            .map_or(true, |cached| !cached.is_fresh(Instant::now()));
        if needs_refresh {
            if let Some(fresh) = self.fetch_rules(url, &host).await {
                *rules = Some(fresh);
            }
        }

        let allowed = rules
            .as_ref()
            .map_or(true, |cached| cached.is_allowed(&path, &self.user_agent));

        if !allowed {
            tracing::debug!(url = %url, "Disallowed by robots.txt");
        }
        allowed
    }

    /// Crawl-delay declared for `host`, if its rules are already cached
    pub async fn crawl_delay_for(&self, host: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        let entry = self.hosts.lock().await.get(host).cloned()?;
        let rules = entry.lock().await;
        rules
            .as_ref()
            .and_then(|cached| cached.crawl_delay(&self.user_agent))
    }

    /// Number of hosts with a cached document
    pub async fn cached_hosts(&self) -> usize {
        let entries: Vec<HostEntry> = self.hosts.lock().await.values().cloned().collect();

        let mut cached = 0;
        for entry in entries {
            if entry.lock().await.is_some() {
                cached += 1;
            }
        }
        cached
    }

    async fn entry(&self, host: &str) -> HostEntry {
        self.hosts
            .lock()
            .await
            .entry(host.to_string())
            .or_default()
            .clone()
    }

    /// Fetches and parses a host's robots.txt; `None` when the run was cancelled
    async fn fetch_rules(&self, url: &Url, host: &str) -> Option<CachedRules> {
        let document = match robots_url(url) {
            Some(robots) => {
                tracing::debug!(host = %host, url = %robots, "Fetching robots.txt");
                let mut target = CrawlTarget::policy(robots);
                match self.scheduler.admit(&mut target, None).await {
                    Ok(page) => RulesDocument::Rules(AccessRuleSet::parse(&page.body)),
                    Err(err) if err.is_cancelled() => return None,
                    Err(FetchError::Terminal { status_code, .. })
                        if (400..500).contains(&status_code) =>
                    {
                        tracing::debug!(host = %host, status_code, "No robots.txt, allowing all");
                        RulesDocument::NotFound
                    }
                    Err(err) => {
                        tracing::warn!(
                            host = %host,
                            error = %err,
                            "robots.txt unavailable, allowing all"
                        );
                        RulesDocument::Unavailable
                    }
                }
            }
            None => RulesDocument::Unavailable,
        };

        let ttl = match document {
            RulesDocument::Unavailable => self.failure_ttl,
            _ => self.cache_ttl,
        };

        Some(CachedRules::new(document, ttl, Instant::now()))
    }
}
