//! Resilient HTTP transport
//!
//! Every network operation of the bot goes through this layer:
//! - the robots policy for the target host is consulted first; a forbidden
//!   URL raises [`RelayError::PolicyViolation`] without any network call
//! - the per-host throttle is waited on before the request goes out
//! - 502/503 responses are retried with a linearly increasing delay up to a
//!   configured bound, then surfaced as [`RelayError::Transient`]
//! - multipart uploads are never retried, because the publishing service is
//!   not assumed to deduplicate a replayed upload

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::context::CrawlContext;
use crate::robots::RobotsPolicy;
use crate::{RelayError, Result};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds the HTTP client used for all requests
///
/// The User-Agent identifies the bot and its operator:
/// `Name/Version (+ContactURL; ContactEmail)`.
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

/// HTTP transport with robots gating, throttling and bounded retry
pub struct ResilientTransport {
    client: Client,
    context: Arc<CrawlContext>,
    retry_limit: u32,
    backoff_unit: Duration,
}

impl ResilientTransport {
    /// Creates a transport bound to a crawl context
    pub fn new(
        context: Arc<CrawlContext>,
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(user_agent, crawler)?,
            context,
            retry_limit: crawler.retry_limit,
            backoff_unit: Duration::from_millis(crawler.retry_backoff_ms),
        })
    }

    /// Creates a transport from an existing client (tests, embedding)
    pub fn with_client(client: Client, context: Arc<CrawlContext>) -> Self {
        Self {
            client,
            context,
            retry_limit: 5,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Overrides the retry backoff unit (tests)
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// The crawl context this transport is bound to
    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.context
    }

    /// Makes sure a robots policy exists for the URL's host
    ///
    /// Fetches `/robots.txt` once per host (throttled, but not itself
    /// robots-gated), refreshing it once the cached document goes stale.
    /// Absence or any fetch failure installs the permissive policy: a host
    /// that publishes no rules is crawled at the configured default pace.
    pub async fn ensure_policy(&self, url: &Url) {
        let host = match url.host_str() {
            Some(h) => h.to_string(),
            None => return,
        };

        if let Some(policy) = self.context.policy_for(&host) {
            if !policy.is_stale() {
                return;
            }
            tracing::debug!("Robots policy for {} is stale, refreshing", host);
        }

        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        self.context.throttle().wait_for_delay(&host).await;

        let policy = match self.client.get(robots_url.clone()).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => RobotsPolicy::parse(robots_url, &body),
                Err(e) => {
                    tracing::debug!("Failed to read robots.txt body for {}: {}", host, e);
                    RobotsPolicy::permissive(robots_url)
                }
            },
            Ok(response) => {
                tracing::debug!(
                    "No robots.txt for {} (status {}), applying permissive policy",
                    host,
                    response.status()
                );
                RobotsPolicy::permissive(robots_url)
            }
            Err(e) => {
                tracing::debug!(
                    "Failed to fetch robots.txt for {}: {}, applying permissive policy",
                    host,
                    e
                );
                RobotsPolicy::permissive(robots_url)
            }
        };

        self.context.install_policy(policy).await;
    }

    /// Robots check plus throttle wait; called before every request
    ///
    /// A forbidden URL fails here, before any ThrottleState is advanced and
    /// before anything reaches the network.
    async fn gate(&self, url: &Url) -> Result<()> {
        let host = url
            .host_str()
            .ok_or_else(|| RelayError::Fatal(format!("URL without host: {}", url)))?
            .to_string();

        self.ensure_policy(url).await;

        if let Some(policy) = self.context.policy_for(&host) {
            if !policy.is_allowed(url, self.context.user_agent())? {
                return Err(RelayError::PolicyViolation {
                    url: url.to_string(),
                });
            }
        }

        self.context.throttle().wait_for_delay(&host).await;
        Ok(())
    }

    /// Issues a prepared request, retrying 502/503 with linear backoff
    ///
    /// Attempt n (1-based) sleeps `n * backoff_unit` before the next try.
    /// Other error statuses propagate immediately.
    async fn send_with_retry(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<Vec<u8>> {
        let mut last_status = StatusCode::BAD_GATEWAY;

        for attempt in 1..=self.retry_limit + 1 {
            let request = request
                .try_clone()
                .ok_or_else(|| RelayError::Fatal("request body is not replayable".to_string()))?;

            let response = request.send().await.map_err(|source| RelayError::Http {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            if status == StatusCode::BAD_GATEWAY || status == StatusCode::SERVICE_UNAVAILABLE {
                last_status = status;
                if attempt <= self.retry_limit {
                    let delay = self.backoff_unit * attempt;
                    tracing::warn!(
                        "Server error {} for {}, retry {}/{} in {:?}",
                        status,
                        url,
                        attempt,
                        self.retry_limit,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                break;
            }

            if !status.is_success() {
                return Err(RelayError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(|source| RelayError::Http {
                url: url.to_string(),
                source,
            })?;
            return Ok(body.to_vec());
        }

        Err(RelayError::Transient {
            url: url.to_string(),
            status: last_status.as_u16(),
        })
    }

    /// Fetches a URL with GET, returning the response body
    pub async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        self.gate(url).await?;
        self.send_with_retry(self.client.get(url.clone()), url).await
    }

    /// POSTs a key-value map as a URL-encoded form body
    pub async fn post_form(&self, url: &Url, form: &[(String, String)]) -> Result<Vec<u8>> {
        self.gate(url).await?;
        self.send_with_retry(self.client.post(url.clone()).form(form), url)
            .await
    }

    /// POSTs a pre-encoded form body
    pub async fn post_body(&self, url: &Url, body: String) -> Result<Vec<u8>> {
        self.gate(url).await?;
        let request = self
            .client
            .post(url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        self.send_with_retry(request, url).await
    }

    /// Performs a multipart/form-data upload: one part per field plus one
    /// file part
    ///
    /// Not retried; the publishing service is not assumed to be idempotent
    /// for uploads, and a duplicate submission is worse than a surfaced
    /// error.
    pub async fn upload(
        &self,
        url: &Url,
        fields: &[(String, String)],
        file_name: &str,
        content_type: &str,
        file_bytes: Vec<u8>,
    ) -> Result<Vec<u8>> {
        self.gate(url).await?;

        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        form = form.part("file", part);

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|source| RelayError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| RelayError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}
