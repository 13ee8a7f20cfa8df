//! Configuration validation
//!
//! Validates a parsed configuration before any collection starts, so that
//! bad budgets and unusable endpoints fail fast instead of mid-run.

use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a parsed configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is usable
/// * `Err(ConfigError)` - A value that would break collection at runtime
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let collector = &config.collector;

    if collector.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent must not be empty".to_string(),
        ));
    }

    if collector.robots_cache_ttl_ms == 0 {
        return Err(ConfigError::Validation(
            "robots-cache-ttl-ms must be greater than zero".to_string(),
        ));
    }

    if collector.max_results_per_query == 0 {
        return Err(ConfigError::Validation(
            "max-results-per-query must be greater than zero".to_string(),
        ));
    }

    if collector.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-ms must be greater than zero".to_string(),
        ));
    }

    if let Some(proxy) = &collector.proxy_url {
        Url::parse(proxy).map_err(|e| {
            ConfigError::InvalidUrl(format!("proxy-url {:?} is not a valid URL: {}", proxy, e))
        })?;
    }

    if config.engines.is_empty() {
        return Err(ConfigError::Validation(
            "at least one engine must be configured".to_string(),
        ));
    }

    for (name, engine) in &config.engines {
        if !engine.enabled {
            continue;
        }

        if engine.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "engine {:?} is enabled but has an empty endpoint",
                name
            )));
        }

        if !engine.endpoint.contains("{query}") {
            return Err(ConfigError::Validation(format!(
                "engine {:?} endpoint is missing the {{query}} placeholder",
                name
            )));
        }

        // Probe the template with a dummy query so URL errors surface here
        let probe = engine.endpoint.replace("{query}", "probe");
        Url::parse(&probe).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "engine {:?} endpoint {:?} is not a valid URL: {}",
                name, engine.endpoint, e
            ))
        })?;
    }

    Ok(())
}
