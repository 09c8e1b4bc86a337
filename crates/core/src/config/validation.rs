//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 600_000;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value < MIN_TIMEOUT_MS {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value > MAX_TIMEOUT_MS {
        return Err(invalid(field, "must not exceed 10 minutes (600000ms)"));
    }
    Ok(())
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value).map_err(|e| invalid(field, format!("not a valid URL: {e}")))?;
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a timeout is under 100ms or over 10 minutes
    /// - the orchestration ceiling is shorter than one step
    /// - `max_retries` is outside 1..=10
    /// - a TTL is zero, or pending sessions outlive cached results
    /// - a portal URL does not parse
    /// - a selector list is empty
    /// - the demo CAPTCHA answer is set but blank
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeout("step_timeout_ms", self.step_timeout_ms)?;
        check_timeout("orchestration_timeout_ms", self.orchestration_timeout_ms)?;
        if self.orchestration_timeout_ms < self.step_timeout_ms {
            return Err(invalid("orchestration_timeout_ms", "must be at least step_timeout_ms"));
        }
        if self.retry_delay_ms > MAX_TIMEOUT_MS {
            return Err(invalid("retry_delay_ms", "must not exceed 10 minutes (600000ms)"));
        }

        if !(1..=10).contains(&self.max_retries) {
            return Err(invalid("max_retries", "must be between 1 and 10"));
        }

        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "must be greater than 0"));
        }
        if self.pending_ttl_secs == 0 {
            return Err(invalid("pending_ttl_secs", "must be greater than 0"));
        }
        if self.pending_ttl_secs >= self.cache_ttl_secs {
            return Err(invalid("pending_ttl_secs", "must be shorter than cache_ttl_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("sweep_interval_secs", "must be greater than 0"));
        }

        check_url("portal_base_url", &self.portal_base_url)?;
        check_url("search_url", &self.search_url)?;
        for url in &self.fallback_urls {
            check_url("fallback_urls", url)?;
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(name) = self.selectors.empty_lists().first() {
            return Err(invalid(&format!("selectors.{name}"), "must list at least one selector"));
        }

        if self.demo_captcha.as_deref().is_some_and(|answer| answer.trim().is_empty()) {
            return Err(invalid("demo_captcha", "must not be blank; unset it to disable the demo CAPTCHA"));
        }

        if self.demo_mode {
            tracing::warn!("demo_mode is enabled; queries are answered by the fixture portal");
        }

        Ok(())
    }
}
