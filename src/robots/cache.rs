//! Robots.txt caching implementation
//!
//! Each host's document is cached with its own time-to-live: a fetched or
//! missing document lives for the regular TTL, an unreachable one for the
//! shorter failure TTL.

use super::parser::AccessRuleSet;
use std::time::Duration;
use tokio::time::Instant;

/// What a robots.txt fetch produced
#[derive(Debug, Clone, PartialEq)]
pub enum RulesDocument {
    /// 2xx response, parsed
    Rules(AccessRuleSet),

    /// 4xx response; the site publishes no restrictions
    NotFound,

    /// Network failure, timeout or 5xx; treated as allow-all
    Unavailable,
}

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRules {
    pub document: RulesDocument,

    /// When the robots.txt was fetched
    pub fetched_at: Instant,

    pub ttl: Duration,
}

impl CachedRules {
    pub fn new(document: RulesDocument, ttl: Duration, now: Instant) -> Self {
        Self {
            document,
            fetched_at: now,
            ttl,
        }
    }

    /// Returns true while the entry is younger than its TTL
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        match &self.document {
            RulesDocument::Rules(rules) => rules.is_allowed(path, user_agent),
            RulesDocument::NotFound | RulesDocument::Unavailable => true,
        }
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        match &self.document {
            RulesDocument::Rules(rules) => rules.crawl_delay(user_agent),
            RulesDocument::NotFound | RulesDocument::Unavailable => None,
        }
    }
}
