//! Catalog-Relay: a resumable content-ingestion bot
//!
//! This crate implements the crawl/publish engine for a long-running bot that
//! harvests media metadata from third-party catalog sites, caches it locally,
//! and later republishes derived artifacts to a wiki-style repository. It
//! respects each host's robots policy and enforces per-host request pacing.
//!
//! The per-source glue (metadata mapping, page templates, the publishing API
//! itself) lives outside this crate behind the [`pipeline::Parser`],
//! [`pipeline::ArtifactBuilder`] and [`pipeline::Publisher`] traits.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod robots;
pub mod throttle;
pub mod transport;

use thiserror::Error;

/// Main error type for Catalog-Relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Robots policy forbids request: {url}")]
    PolicyViolation { url: String },

    #[error("Transient server error {status} for {url} (retries exhausted)")]
    Transient { url: String, status: u16 },

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Policy for host {expected} queried with URL on host {got}")]
    HostMismatch { expected: String, got: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file error: {0}")]
    State(String),

    #[error("Fatal job error: {0}")]
    Fatal(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Catalog-Relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Classification of a per-item failure.
///
/// Items fail individually without aborting the batch; the kind decides
/// whether a later run should retry the key. `Fatal` is the exception: it
/// marks the whole source as unusable and aborts the run after flushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed content for this item
    Parse,
    /// Missing or inconsistent domain data (no license, no creator, ...)
    Validation,
    /// Network-level failure that exhausted its retry budget
    Transient,
    /// Robots policy forbade the request
    Policy,
    /// Malformed source, not malformed item; aborts the run
    Fatal,
}

impl FailureKind {
    /// Stable label used as the reason-string prefix in the failed ledger
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Parse => "parse",
            FailureKind::Validation => "validation",
            FailureKind::Transient => "transient",
            FailureKind::Policy => "policy",
            FailureKind::Fatal => "fatal",
        }
    }

    /// Whether a key failed with this kind should be attempted again on the
    /// next run without operator intervention
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Validation | FailureKind::Transient)
    }

    /// Recovers the kind from a ledger reason string
    pub fn from_reason(reason: &str) -> Option<FailureKind> {
        let label = reason.split(':').next()?.trim();
        match label {
            "parse" => Some(FailureKind::Parse),
            "validation" => Some(FailureKind::Validation),
            "transient" => Some(FailureKind::Transient),
            "policy" => Some(FailureKind::Policy),
            "fatal" => Some(FailureKind::Fatal),
            _ => None,
        }
    }
}

/// A tagged per-item failure, recorded into the failed ledger.
///
/// Builder and parser hooks return this instead of raising through the batch
/// loop, so retryable and terminal outcomes stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }

    /// The reason string persisted to the failed ledger
    pub fn reason(&self) -> String {
        format!("{}: {}", self.kind.label(), self.message)
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

// Re-export commonly used types
pub use config::Config;
pub use context::CrawlContext;
pub use pipeline::{
    BatchCursor, BatchDownloader, BatchProgress, BatchUploader, ItemCache, Metadata,
};
pub use robots::RobotsPolicy;
pub use throttle::HostThrottle;
pub use transport::ResilientTransport;
