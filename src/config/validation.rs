use crate::config::types::{Config, CrawlerConfig, PipelineConfig, ThrottleConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_throttle_config(&config.throttle)?;
    validate_pipeline_config(&config.pipeline)?;
    Ok(())
}

/// Validates HTTP and retry configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.retry_limit > 20 {
        return Err(ConfigError::Validation(format!(
            "retry_limit must be <= 20, got {}",
            config.retry_limit
        )));
    }

    Ok(())
}

/// Validates bot identification configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate bot name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates pacing configuration
fn validate_throttle_config(config: &ThrottleConfig) -> Result<(), ConfigError> {
    if config.default_delay_secs < 1 {
        return Err(ConfigError::Validation(
            "default_delay_secs must be >= 1 (crawl politeness is not optional)".to_string(),
        ));
    }

    for entry in &config.hosts {
        if entry.host.is_empty() {
            return Err(ConfigError::Validation(
                "throttle host override has an empty host".to_string(),
            ));
        }
        if entry.delay_secs < 1 {
            return Err(ConfigError::Validation(format!(
                "delay_secs for host '{}' must be >= 1",
                entry.host
            )));
        }
    }

    Ok(())
}

/// Validates batch pipeline configuration
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.state_dir.is_empty() {
        return Err(ConfigError::Validation(
            "state_dir cannot be empty".to_string(),
        ));
    }

    if config.cache_dir.is_empty() {
        return Err(ConfigError::Validation(
            "cache_dir cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    if config.stop_file.is_empty() {
        return Err(ConfigError::Validation(
            "stop_file cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_zero_delay_rejected() {
        let throttle = ThrottleConfig {
            default_delay_secs: 0,
            hosts: vec![],
        };
        assert!(validate_throttle_config(&throttle).is_err());
    }

    #[test]
    fn test_host_override_validated() {
        let throttle = ThrottleConfig {
            default_delay_secs: 5,
            hosts: vec![crate::config::HostDelayEntry {
                host: String::new(),
                delay_secs: 10,
            }],
        };
        assert!(validate_throttle_config(&throttle).is_err());
    }
}
