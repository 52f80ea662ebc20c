//! Robots.txt parser implementation
//!
//! Splits the document into user-agent groups. Consecutive `User-agent` lines
//! share one group; the first rule line closes the agent list, so a later
//! `User-agent` line starts a new group.

use super::pattern::PathPattern;
use std::time::Duration;

/// Rules declared for one set of user agents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleGroup {
    /// Lowercased agent tokens (`*` for the wildcard group)
    pub agents: Vec<String>,
    pub allow: Vec<PathPattern>,
    pub disallow: Vec<PathPattern>,
    /// Crawl-delay in seconds
    pub crawl_delay: Option<f64>,
}

/// Parsed robots.txt content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessRuleSet {
    groups: Vec<RuleGroup>,
}

impl AccessRuleSet {
    /// Parses raw robots.txt content
    ///
    /// Unknown directives, comments and lines without a `:` are ignored, so
    /// garbage input yields an empty (allow-all) rule set.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<RuleGroup> = Vec::new();
        let mut current: Option<RuleGroup> = None;
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(RuleGroup::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                }
                "allow" | "disallow" | "crawl-delay" => {
                    collecting_agents = false;
                    // Rules before any User-agent line belong to no group
                    let Some(group) = current.as_mut() else {
                        continue;
                    };

                    match key.as_str() {
                        // An empty value restricts nothing
                        "allow" if !value.is_empty() => group.allow.push(PathPattern::new(value)),
                        "disallow" if !value.is_empty() => {
                            group.disallow.push(PathPattern::new(value))
                        }
                        "crawl-delay" => {
                            if let Ok(delay) = value.parse::<f64>() {
                                if delay.is_finite() && delay >= 0.0 {
                                    group.crawl_delay = Some(delay);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if let Some(group) = current {
            groups.push(group);
        }

        Self { groups }
    }

    /// Creates a rule set that restricts nothing
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Picks the group that applies to `user_agent`
    ///
    /// The group whose agent token is the longest one contained in the
    /// (case-insensitive) user agent wins; otherwise the `*` group applies.
    pub fn group_for(&self, user_agent: &str) -> Option<&RuleGroup> {
        let agent = user_agent.to_lowercase();

        let specific = self
            .groups
            .iter()
            .filter_map(|group| {
                group
                    .agents
                    .iter()
                    .filter(|token| token.as_str() != "*" && agent.contains(token.as_str()))
                    .map(String::len)
                    .max()
                    .map(|len| (len, group))
            })
            .fold(None::<(usize, &RuleGroup)>, |best, (len, group)| match best {
                Some((best_len, _)) if best_len >= len => best,
                _ => Some((len, group)),
            })
            .map(|(_, group)| group);

        specific.or_else(|| {
            self.groups
                .iter()
                .find(|group| group.agents.iter().any(|token| token == "*"))
        })
    }

    /// Checks if a path is allowed for the given user agent
    ///
    /// Allow patterns are checked first and win outright; any matching
    /// disallow pattern then denies; no match allows.
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        if group.allow.iter().any(|pattern| pattern.matches(path)) {
            return true;
        }

        !group.disallow.iter().any(|pattern| pattern.matches(path))
    }

    /// Gets the crawl delay for a specific user agent
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|group| group.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}
