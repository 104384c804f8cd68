//! Shared crawl context
//!
//! The original bot kept its host-throttle table and robots policies in
//! process-wide statics. Here they live in an explicitly constructed
//! [`CrawlContext`] that is passed to whatever needs them, so tests can run
//! independent contexts side by side instead of mutating shared process
//! state.

use crate::config::Config;
use crate::robots::RobotsPolicy;
use crate::throttle::HostThrottle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Context shared by every network operation of a run
///
/// Owns the per-host throttle registry and the per-host robots policies.
/// Politeness is process-wide by design: every component that touches a host
/// goes through the same context. Runs spanning multiple OS processes would
/// need a shared backing store for this state; a single process per run is a
/// documented constraint, not a solved problem.
pub struct CrawlContext {
    throttle: HostThrottle,
    robots: Mutex<HashMap<String, Arc<RobotsPolicy>>>,
    user_agent: String,
}

impl CrawlContext {
    /// Builds a context from configuration
    pub fn new(config: &Config) -> Self {
        let overrides = config
            .throttle
            .hosts
            .iter()
            .map(|e| (e.host.clone(), Duration::from_secs(e.delay_secs)))
            .collect();

        Self {
            throttle: HostThrottle::new(
                Duration::from_secs(config.throttle.default_delay_secs),
                overrides,
            ),
            robots: Mutex::new(HashMap::new()),
            user_agent: config.user_agent.header_value(),
        }
    }

    /// Builds a bare context (tests, embedding)
    pub fn with_defaults(user_agent: &str, default_delay: Duration) -> Self {
        Self {
            throttle: HostThrottle::new(default_delay, HashMap::new()),
            robots: Mutex::new(HashMap::new()),
            user_agent: user_agent.to_string(),
        }
    }

    /// The User-Agent header value for all requests
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The per-host throttle registry
    pub fn throttle(&self) -> &HostThrottle {
        &self.throttle
    }

    /// The robots policy installed for a host, if any
    pub fn policy_for(&self, host: &str) -> Option<Arc<RobotsPolicy>> {
        self.robots
            .lock()
            .expect("robots registry poisoned")
            .get(host)
            .cloned()
    }

    /// Installs a robots policy for its host and raises the host's throttle
    /// delay to the policy's crawl delay when that is larger
    pub async fn install_policy(&self, policy: RobotsPolicy) {
        let host = match policy.host().host_str() {
            Some(h) => h.to_string(),
            None => return,
        };

        let delay = policy.crawl_delay(&self.user_agent);
        if delay > 0 {
            self.throttle
                .raise_delay(&host, Duration::from_secs(delay))
                .await;
        }

        self.robots
            .lock()
            .expect("robots registry poisoned")
            .insert(host, Arc::new(policy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_install_policy_raises_throttle_delay() {
        let context = CrawlContext::with_defaults("TestBot/1.0", Duration::from_secs(5));
        let host = Url::parse("https://example.com/").unwrap();
        let policy = RobotsPolicy::parse(host, "User-agent: *\nCrawl-delay: 30");

        context.install_policy(policy).await;

        assert_eq!(
            context.throttle().min_delay("example.com").await,
            Duration::from_secs(30)
        );
        assert!(context.policy_for("example.com").is_some());
    }

    #[tokio::test]
    async fn test_smaller_crawl_delay_does_not_lower_default() {
        let context = CrawlContext::with_defaults("TestBot/1.0", Duration::from_secs(5));
        let host = Url::parse("https://example.com/").unwrap();
        let policy = RobotsPolicy::parse(host, "User-agent: *\nCrawl-delay: 1");

        context.install_policy(policy).await;

        assert_eq!(
            context.throttle().min_delay("example.com").await,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_no_policy_for_unknown_host() {
        let context = CrawlContext::with_defaults("TestBot/1.0", Duration::from_secs(5));
        assert!(context.policy_for("unknown.example.com").is_none());
    }

    #[tokio::test]
    async fn test_independent_contexts() {
        let a = CrawlContext::with_defaults("BotA/1.0", Duration::from_secs(1));
        let b = CrawlContext::with_defaults("BotB/1.0", Duration::from_secs(1));

        let host = Url::parse("https://example.com/").unwrap();
        a.install_policy(RobotsPolicy::parse(host, "User-agent: *\nDisallow: /"))
            .await;

        assert!(a.policy_for("example.com").is_some());
        assert!(b.policy_for("example.com").is_none());
    }
}
