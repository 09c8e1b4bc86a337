//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (COURTFETCH_*)
//! 2. TOML config file (if COURTFETCH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::SelectorTable;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (COURTFETCH_*)
/// 2. TOML config file (if COURTFETCH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite database holding results, sessions and the query log.
    ///
    /// Set via COURTFETCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Portal origin, used to resolve relative document links.
    #[serde(default = "default_portal_base_url")]
    pub portal_base_url: String,

    /// Case status search page.
    ///
    /// Set via COURTFETCH_SEARCH_URL environment variable.
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Alternative entry points tried in order when the search page does
    /// not show a usable form.
    #[serde(default = "default_fallback_urls")]
    pub fallback_urls: Vec<String>,

    /// Upper bound for any single browser wait, in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Hard ceiling for one submit or resume call, in milliseconds.
    #[serde(default = "default_orchestration_timeout_ms")]
    pub orchestration_timeout_ms: u64,

    /// Attempts per submit, each with a fresh browser session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lifetime of a cached parsed record, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Lifetime of a resume token, in seconds.
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,

    /// How often expired sessions are swept, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Serve queries from the built-in fixture portal instead of a browser.
    ///
    /// Set via COURTFETCH_DEMO_MODE environment variable.
    #[serde(default)]
    pub demo_mode: bool,

    /// Answer the fixture portal accepts. `None` disables its CAPTCHA.
    #[serde(default = "default_demo_captcha")]
    pub demo_captcha: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Chrome/Chromium binary. Auto-detected when unset.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Default row count for search history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Portal markup knowledge; override per target via TOML or
    /// COURTFETCH_SELECTORS__<TARGET>.
    #[serde(default)]
    pub selectors: SelectorTable,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./courtfetch.sqlite")
}

fn default_portal_base_url() -> String {
    "https://delhihighcourt.nic.in".into()
}

fn default_search_url() -> String {
    "https://delhihighcourt.nic.in/app/get-case-type-status".into()
}

fn default_fallback_urls() -> Vec<String> {
    vec![
        "https://dhccaseinfo.nic.in/pcase/guiCaseWise.php".into(),
        "http://164.100.69.66/pcase/guiCaseWise.php".into(),
        "https://www.delhihighcourt.nic.in/web/".into(),
    ]
}

fn default_step_timeout_ms() -> u64 {
    20_000
}

fn default_orchestration_timeout_ms() -> u64 {
    120_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_cache_ttl_secs() -> u64 {
    86_400
}

fn default_pending_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_demo_captcha() -> Option<String> {
    Some("ABC123".into())
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .into()
}

fn default_history_limit() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            portal_base_url: default_portal_base_url(),
            search_url: default_search_url(),
            fallback_urls: default_fallback_urls(),
            step_timeout_ms: default_step_timeout_ms(),
            orchestration_timeout_ms: default_orchestration_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            pending_ttl_secs: default_pending_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            demo_mode: false,
            demo_captcha: default_demo_captcha(),
            headless: true,
            chrome_executable: None,
            user_agent: default_user_agent(),
            history_limit: default_history_limit(),
            selectors: SelectorTable::default(),
        }
    }
}

impl AppConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn orchestration_timeout(&self) -> Duration {
        Duration::from_millis(self.orchestration_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs as i64)
    }

    pub fn pending_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_ttl_secs as i64)
    }

    /// Search page first, then each fallback in order.
    pub fn entry_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.search_url.as_str()).chain(self.fallback_urls.iter().map(String::as_str))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `COURTFETCH_`
    /// 2. TOML file from `COURTFETCH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("COURTFETCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("COURTFETCH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
