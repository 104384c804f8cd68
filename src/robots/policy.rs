//! Robots document parsing and per-agent policy lookup

use crate::robots::rules::RuleNode;
use crate::{RelayError, Result};
use chrono::{DateTime, Duration, Utc};
use url::Url;

/// Rules and crawl delay for one `User-agent:` group
#[derive(Debug, Clone)]
pub struct AgentPolicy {
    /// Agent name as written in the document (matched case-insensitively)
    pub name: String,

    /// Path-rule tree, default-allow root
    pub rules: RuleNode,

    /// Requested seconds between requests (0 when unspecified or malformed)
    pub crawl_delay_secs: u64,
}

impl AgentPolicy {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: RuleNode::root(),
            crawl_delay_secs: 0,
        }
    }
}

/// A parsed robots policy, scoped to the host it was fetched for
///
/// Created once per crawl target and read-only afterwards; crawling activity
/// never mutates it. A fresh document replaces the whole policy.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    host: Url,
    agents: Vec<AgentPolicy>,
    sitemaps: Vec<String>,
    fetched_at: DateTime<Utc>,
}

impl RobotsPolicy {
    /// Parses a robots.txt document fetched for `host`
    ///
    /// Line-oriented: recognizes `User-agent:`, `Disallow:`, `Allow:`,
    /// `Crawl-delay:` and `Sitemap:` case-insensitively. Comment lines and
    /// lines with fewer than two whitespace-delimited tokens are ignored, as
    /// are rule lines appearing before any `User-agent:` line. A malformed
    /// crawl delay leaves the value at 0.
    pub fn parse(host: Url, document: &str) -> Self {
        let mut agents: Vec<AgentPolicy> = Vec::new();
        let mut sitemaps = Vec::new();

        for line in document.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            let directive = match tokens.next() {
                Some(d) => d.to_ascii_lowercase(),
                None => continue,
            };
            let value = match tokens.next() {
                Some(v) => v,
                None => continue,
            };

            match directive.as_str() {
                "user-agent:" => {
                    agents.push(AgentPolicy::new(value));
                }
                "disallow:" => {
                    if let Some(current) = agents.last_mut() {
                        current.rules.add_pattern(false, value);
                    }
                }
                "allow:" => {
                    if let Some(current) = agents.last_mut() {
                        current.rules.add_pattern(true, value);
                    }
                }
                "crawl-delay:" => {
                    if let Some(current) = agents.last_mut() {
                        if let Ok(secs) = value.parse::<u64>() {
                            current.crawl_delay_secs = secs;
                        }
                    }
                }
                "sitemap:" => {
                    sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        Self {
            host,
            agents,
            sitemaps,
            fetched_at: Utc::now(),
        }
    }

    /// Creates a policy that allows everything for `host`
    ///
    /// Used when robots.txt is absent or cannot be fetched; treating absence
    /// as permissive is an explicit choice of the surrounding system.
    pub fn permissive(host: Url) -> Self {
        Self {
            host,
            agents: Vec::new(),
            sitemaps: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// The host this policy was fetched for
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Sitemap URLs listed in the document
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Whether the fetched document is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }

    /// Selects the policy group for a requesting agent
    ///
    /// Historical quirk, preserved on purpose: the first group whose *name is
    /// a substring of the requesting agent* (case-insensitive) wins, with
    /// "first" meaning document order; `"*"` is the fallback. A standard
    /// matcher would test the reverse containment or prefer the most specific
    /// name, but existing crawl behavior depends on this rule.
    fn match_agent(&self, agent: &str) -> Option<&AgentPolicy> {
        let agent_lower = agent.to_lowercase();

        self.agents
            .iter()
            .find(|p| p.name != "*" && agent_lower.contains(&p.name.to_lowercase()))
            .or_else(|| self.agents.iter().find(|p| p.name == "*"))
    }

    /// Checks whether a full URL may be fetched by `agent`
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HostMismatch`] when the URL's host differs from
    /// the policy's host; a policy is host-scoped and querying it for another
    /// host is a caller error.
    pub fn is_allowed(&self, url: &Url, agent: &str) -> Result<bool> {
        if url.host_str() != self.host.host_str() {
            return Err(RelayError::HostMismatch {
                expected: self.host.host_str().unwrap_or("").to_string(),
                got: url.host_str().unwrap_or("").to_string(),
            });
        }
        Ok(self.is_path_allowed(url.path(), agent))
    }

    /// Checks whether a path may be fetched by `agent`
    ///
    /// An agent with no matching group (including on a permissive policy) is
    /// allowed everywhere.
    pub fn is_path_allowed(&self, path: &str, agent: &str) -> bool {
        match self.match_agent(agent) {
            Some(policy) => policy.rules.is_allowed(path),
            None => true,
        }
    }

    /// Returns the crawl delay requested for `agent`, in seconds
    pub fn crawl_delay(&self, agent: &str) -> u64 {
        self.match_agent(agent)
            .map(|p| p.crawl_delay_secs)
            .unwrap_or(0)
    }
}
