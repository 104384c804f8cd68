use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let config: Config = toml::from_str(&content)?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
request-timeout-secs = 30
retry-limit = 5
retry-backoff-ms = 1000

[user-agent]
crawler-name = "TestRelay"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[throttle]
default-delay-secs = 5

[[throttle.hosts]]
host = "slow.example.com"
delay-secs = 30

[pipeline]
state-dir = "./state"
cache-dir = "./cache"
checkpoint-interval = 10
stop-file = "./stop"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.retry_limit, 5);
        assert_eq!(config.user_agent.crawler_name, "TestRelay");
        assert_eq!(config.throttle.default_delay_secs, 5);
        assert_eq!(config.throttle.hosts.len(), 1);
        assert_eq!(config.throttle.hosts[0].delay_secs, 30);
        assert_eq!(config.pipeline.checkpoint_interval, 10);
        assert!(!config.pipeline.force_refresh);
    }

    #[test]
    fn test_defaults_applied() {
        let minimal = r#"
[crawler]

[user-agent]
crawler-name = "TestRelay"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[pipeline]
state-dir = "./state"
cache-dir = "./cache"
"#;
        let file = create_temp_config(minimal);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.request_timeout_secs, 30);
        assert_eq!(config.crawler.retry_limit, 5);
        assert_eq!(config.throttle.default_delay_secs, 5);
        assert_eq!(config.pipeline.checkpoint_interval, 1);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let bad = VALID_CONFIG.replace("crawler-name = \"TestRelay\"", "crawler-name = \"\"");
        let file = create_temp_config(&bad);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
