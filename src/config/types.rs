use serde::Deserialize;

/// Main configuration structure for Catalog-Relay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    pub pipeline: PipelineConfig,
}

/// HTTP and retry behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Per-request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of retries after a 502/503 response
    #[serde(rename = "retry-limit", default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Base unit of the linear retry backoff, in milliseconds
    /// (attempt n sleeps n * this value)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Bot identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the bot
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the bot
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the bot
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for bot-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// The User-Agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Per-host pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum seconds between requests to the same host, unless a robots
    /// policy or a per-host override asks for more
    #[serde(rename = "default-delay-secs", default = "default_delay_secs")]
    pub default_delay_secs: u64,

    /// Explicit per-host delay overrides
    #[serde(default)]
    pub hosts: Vec<HostDelayEntry>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay_secs(),
            hosts: Vec::new(),
        }
    }
}

/// Explicit delay override for one host
#[derive(Debug, Clone, Deserialize)]
pub struct HostDelayEntry {
    /// Host name (e.g., "content.lib.example.edu")
    pub host: String,

    /// Minimum seconds between requests to this host
    #[serde(rename = "delay-secs")]
    pub delay_secs: u64,
}

/// Batch pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding checkpoint and ledgers for this job
    #[serde(rename = "state-dir")]
    pub state_dir: String,

    /// Directory holding cached item metadata and raw assets
    #[serde(rename = "cache-dir")]
    pub cache_dir: String,

    /// Flush ledgers and auxiliary state every N items
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Sentinel file checked between items; its presence stops the run
    #[serde(rename = "stop-file", default = "default_stop_file")]
    pub stop_file: String,

    /// Re-publish keys already in the succeeded ledger
    #[serde(rename = "force-refresh", default)]
    pub force_refresh: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_limit() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_delay_secs() -> u64 {
    5
}

fn default_checkpoint_interval() -> u32 {
    1
}

fn default_stop_file() -> String {
    "./stop".to_string()
}
