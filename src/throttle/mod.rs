//! Per-host request pacing
//!
//! Crawl politeness is enforced per host across every caller in the process:
//! one [`ThrottleState`] exists per distinct host, created lazily, never
//! evicted, and consulted on every network operation regardless of which
//! pipeline phase issues it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pacing state for one host
#[derive(Debug)]
pub struct ThrottleState {
    /// Host name this state belongs to
    pub host: String,

    /// Minimum wall-clock interval between requests to this host
    pub min_delay: Duration,

    /// When the last gated request went out (None before the first request)
    pub last_request_at: Option<Instant>,
}

impl ThrottleState {
    fn new(host: &str, min_delay: Duration) -> Self {
        Self {
            host: host.to_string(),
            min_delay,
            last_request_at: None,
        }
    }

    /// Raises the minimum delay; never lowers it
    ///
    /// Fed from robots crawl-delay directives, which may only make us more
    /// polite than the configured default.
    pub fn raise_delay(&mut self, delay: Duration) {
        if delay > self.min_delay {
            self.min_delay = delay;
        }
    }

    /// How long a request issued at `now` would still have to wait
    pub fn remaining_wait(&self, now: Instant) -> Duration {
        match self.last_request_at {
            Some(last) => {
                let elapsed = now.duration_since(last);
                self.min_delay.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }
}

/// Process-wide registry of per-host throttle states
///
/// Owned by a [`crate::CrawlContext`] rather than a global static so tests
/// can build independent registries. Under the single-process-per-run
/// constraint this is the only throttle state that exists for a host.
pub struct HostThrottle {
    default_delay: Duration,
    overrides: HashMap<String, Duration>,
    states: Mutex<HashMap<String, Arc<tokio::sync::Mutex<ThrottleState>>>>,
}

impl HostThrottle {
    /// Creates a registry with a default delay and explicit per-host overrides
    pub fn new(default_delay: Duration, overrides: HashMap<String, Duration>) -> Self {
        Self {
            default_delay,
            overrides,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Gets or lazily creates the throttle state for a host
    pub fn get_or_create(&self, host: &str) -> Arc<tokio::sync::Mutex<ThrottleState>> {
        let mut states = self.states.lock().expect("throttle registry poisoned");
        states
            .entry(host.to_string())
            .or_insert_with(|| {
                let delay = self
                    .overrides
                    .get(host)
                    .copied()
                    .unwrap_or(self.default_delay);
                Arc::new(tokio::sync::Mutex::new(ThrottleState::new(host, delay)))
            })
            .clone()
    }

    /// Blocks until the host's minimum interval has elapsed, then stamps the
    /// request time
    ///
    /// The host's state stays locked across the sleep, so two logical
    /// requests to the same host can never both observe "no wait needed" -
    /// the second caller queues on the mutex and re-reads the stamp the first
    /// caller just wrote.
    pub async fn wait_for_delay(&self, host: &str) {
        let state = self.get_or_create(host);
        let mut guard = state.lock().await;

        let wait = guard.remaining_wait(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Throttling {} for {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }

        guard.last_request_at = Some(Instant::now());
    }

    /// Raises (never lowers) a host's minimum delay
    pub async fn raise_delay(&self, host: &str, delay: Duration) {
        let state = self.get_or_create(host);
        state.lock().await.raise_delay(delay);
    }

    /// Current minimum delay for a host (creates the state if absent)
    pub async fn min_delay(&self, host: &str) -> Duration {
        let state = self.get_or_create(host);
        let delay = state.lock().await.min_delay;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle_with_default(ms: u64) -> HostThrottle {
        HostThrottle::new(Duration::from_millis(ms), HashMap::new())
    }

    #[test]
    fn test_remaining_wait_fresh_host() {
        let state = ThrottleState::new("example.com", Duration::from_secs(5));
        assert_eq!(state.remaining_wait(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_remaining_wait_after_request() {
        let mut state = ThrottleState::new("example.com", Duration::from_millis(1000));
        let now = Instant::now();
        state.last_request_at = Some(now);

        let wait = state.remaining_wait(now + Duration::from_millis(400));
        assert_eq!(wait, Duration::from_millis(600));

        let wait = state.remaining_wait(now + Duration::from_millis(1500));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn test_raise_delay_is_monotonic() {
        let mut state = ThrottleState::new("example.com", Duration::from_secs(5));

        state.raise_delay(Duration::from_secs(10));
        assert_eq!(state.min_delay, Duration::from_secs(10));

        // Lowering is ignored
        state.raise_delay(Duration::from_secs(2));
        assert_eq!(state.min_delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_first_call_returns_immediately() {
        let throttle = throttle_with_default(5000);

        let start = Instant::now();
        throttle.wait_for_delay("example.com").await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let throttle = throttle_with_default(100);

        throttle.wait_for_delay("example.com").await;
        let start = Instant::now();
        throttle.wait_for_delay("example.com").await;

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_distinct_hosts_do_not_block_each_other() {
        let throttle = throttle_with_default(5000);

        throttle.wait_for_delay("a.example.com").await;
        let start = Instant::now();
        throttle.wait_for_delay("b.example.com").await;

        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_per_host_override() {
        let mut overrides = HashMap::new();
        overrides.insert("slow.example.com".to_string(), Duration::from_secs(30));
        let throttle = HostThrottle::new(Duration::from_secs(5), overrides);

        assert_eq!(
            throttle.min_delay("slow.example.com").await,
            Duration::from_secs(30)
        );
        assert_eq!(
            throttle.min_delay("fast.example.com").await,
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_registry_raise_delay() {
        let throttle = throttle_with_default(1000);

        throttle
            .raise_delay("example.com", Duration::from_secs(12))
            .await;
        assert_eq!(
            throttle.min_delay("example.com").await,
            Duration::from_secs(12)
        );

        throttle
            .raise_delay("example.com", Duration::from_secs(1))
            .await;
        assert_eq!(
            throttle.min_delay("example.com").await,
            Duration::from_secs(12)
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_serialize() {
        let throttle = Arc::new(throttle_with_default(50));

        // Two tasks racing on the same host must come out at least one
        // interval apart
        let t1 = {
            let throttle = throttle.clone();
            tokio::spawn(async move {
                throttle.wait_for_delay("example.com").await;
                Instant::now()
            })
        };
        let t2 = {
            let throttle = throttle.clone();
            tokio::spawn(async move {
                throttle.wait_for_delay("example.com").await;
                Instant::now()
            })
        };

        let (a, b) = (t1.await.unwrap(), t2.await.unwrap());
        let gap = if a > b { a - b } else { b - a };
        assert!(gap >= Duration::from_millis(50));
    }
}
