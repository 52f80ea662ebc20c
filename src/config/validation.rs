use crate::config::types::{
    AccessPolicyConfig, Config, CrawlerConfig, ExtractorConfig, FetchConfig, OutputConfig,
    QuotaConfig, RetryConfig, UserAgentConfig,
};
use crate::extract::SelectorStrategy;
use crate::url::PAGE_PLACEHOLDER;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_quota_config(&config.quota)?;
    validate_retry_config(&config.retry)?;
    validate_fetch_config(&config.fetch)?;
    validate_access_policy_config(&config.access_policy)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_extractor_config(&config.extractor)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let probe = config.start_url.replace(PAGE_PLACEHOLDER, "1");
    let url = Url::parse(&probe).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid start_url '{}': {}", config.start_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "start_url '{}' must use HTTP or HTTPS",
            config.start_url
        )));
    }

    if config.page_param.is_empty() && !config.start_url.contains(PAGE_PLACEHOLDER) {
        return Err(ConfigError::Validation(
            "page_param cannot be empty when start_url has no {page} placeholder".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.concurrency_limit < 1 || config.concurrency_limit > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency_limit must be between 1 and 100, got {}",
            config.concurrency_limit
        )));
    }

    Ok(())
}

fn validate_quota_config(config: &QuotaConfig) -> Result<(), ConfigError> {
    if config.window_ms < 1 {
        return Err(ConfigError::Validation(
            "quota window_ms must be >= 1".to_string(),
        ));
    }

    if config.capacity < 1 {
        return Err(ConfigError::Validation(
            "quota capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and timeout_secs ({}), got {}",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    if config.transport_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "transport_retries must be <= 10, got {}",
            config.transport_retries
        )));
    }

    Ok(())
}

fn validate_access_policy_config(config: &AccessPolicyConfig) -> Result<(), ConfigError> {
    if config.cache_ttl_secs < 60 {
        return Err(ConfigError::Validation(format!(
            "access-policy cache_ttl_secs must be >= 60, got {}",
            config.cache_ttl_secs
        )));
    }

    if config.failure_ttl_secs < 1 || config.failure_ttl_secs > config.cache_ttl_secs {
        return Err(ConfigError::Validation(format!(
            "access-policy failure_ttl_secs must be between 1 and cache_ttl_secs ({}), got {}",
            config.cache_ttl_secs, config.failure_ttl_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
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

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// The strategy must resolve to a usable set of selectors
fn validate_extractor_config(config: &ExtractorConfig) -> Result<(), ConfigError> {
    SelectorStrategy::from_config(config)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("extractor: {}", e)))
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

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

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
