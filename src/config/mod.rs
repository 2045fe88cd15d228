use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::{GovernorError, Result};
use crate::storage::BackendKind;

/// Governor runtime configuration.
///
/// Every field can be supplied as a CLI flag or a `GOVR_*` environment
/// variable; library callers construct it directly and call `validate`
/// before handing it to the governor.
#[derive(Debug, Clone, Parser)]
#[command(name = "govr")]
#[command(about = "Local decision coordinator for rulepack-based governance")]
pub struct Config {
    /// Base URL of the rulepack control plane
    #[arg(
        long,
        default_value = "https://api.govr.dev",
        env = "GOVR_API_BASE_URL"
    )]
    pub api_base_url: String,

    /// API key presented as a bearer token on rulepack fetches
    #[arg(long, default_value = "", env = "GOVR_API_KEY")]
    pub api_key: String,

    /// Rulepack cache TTL in seconds
    #[arg(long, default_value = "300", env = "GOVR_CACHE_TTL_SECS")]
    pub cache_ttl_secs: u64,

    /// HTTP timeout for control-plane requests in seconds
    #[arg(long, default_value = "10", env = "GOVR_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,

    /// Evaluate using cached rulepacks only; never touch the network
    #[arg(long, default_value = "false", env = "GOVR_OFFLINE_MODE")]
    pub offline_mode: bool,

    /// Capacity of the offline replay queue
    #[arg(long, default_value = "1024", env = "GOVR_OFFLINE_QUEUE_SIZE")]
    pub offline_queue_size: usize,

    /// Audit storage backend (currently only "memory")
    #[arg(long, default_value = "memory", env = "GOVR_STORAGE_BACKEND")]
    pub storage_backend: String,

    /// Backend-specific storage DSN
    #[arg(long, env = "GOVR_STORAGE_DSN")]
    pub storage_dsn: Option<String>,

    /// Record decision metrics
    #[arg(long, default_value = "true", env = "GOVR_METRICS_ENABLED")]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,
}

impl Config {
    /// Sanity-check the configuration. A failure here is fatal: the governor
    /// refuses to build from an invalid config.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_base_url)
            .map_err(|e| GovernorError::Config(format!("invalid api_base_url: {}", e)))?;
        if self.api_key.is_empty() {
            return Err(GovernorError::Config("api_key is required".to_string()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(GovernorError::Config(
                "cache_ttl_secs must be > 0".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(GovernorError::Config(
                "http_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.offline_queue_size == 0 {
            return Err(GovernorError::Config(
                "offline_queue_size must be > 0".to_string(),
            ));
        }
        if BackendKind::parse(&self.storage_backend).is_none() {
            return Err(GovernorError::Config(format!(
                "unsupported storage backend: {}",
                self.storage_backend
            )));
        }
        Ok(())
    }

    /// Get the rulepack cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Get the control-plane HTTP timeout as a Duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "https://api.govr.dev".to_string(),
            api_key: String::new(),
            cache_ttl_secs: 300,
            http_timeout_secs: 10,
            offline_mode: false,
            offline_queue_size: 1024,
            storage_backend: "memory".to_string(),
            storage_dsn: None,
            metrics_enabled: true,
            log_level: "info".to_string(),
        }
    }
}
