//! # Discovery Configuration System
//!
//! Configuration for the registry connection, the health check attached to
//! every registration, and the watch subscriptions behind the discovery cache.
//!
//! ## Architecture
//!
//! - **Layered Sources**: `config/discovery.toml`, an environment-specific
//!   override file, then `DISCOVERY_*` environment variables
//! - **Defaults Everywhere**: every field has a default, so an empty source set
//!   yields a working local-Consul configuration
//! - **Explicit Validation**: invalid values fail loading instead of surfacing
//!   later as registry errors
//!
//! ## Usage
//!
//! ```rust,no_run
//! use discovery_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let registry_url = manager.config().registry.base_url();
//! let wait = manager.config().registry.watch_wait_secs;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{defaults, DEFAULT_CHECK_INTERVAL, DEFAULT_DEREGISTER_CRITICAL_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring discovery.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Registry (Consul agent) connection settings
    pub registry: RegistryConfig,

    /// Health check attached to registrations
    pub health_check: HealthCheckConfig,

    /// Watch subscription behaviour
    pub watch: WatchConfig,
}

/// Registry connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,
    pub request_timeout_ms: u64,
    /// Upper bound the registry may hold a blocking watch query open
    pub watch_wait_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: defaults::REGISTRY_HOST.to_string(),
            port: defaults::REGISTRY_PORT,
            scheme: "http".to_string(),
            token: None,
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            watch_wait_secs: defaults::WATCH_WAIT_SECS,
        }
    }
}

impl RegistryConfig {
    /// Base URL of the registry agent, e.g. `http://127.0.0.1:8500`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn watch_wait(&self) -> Duration {
        Duration::from_secs(self.watch_wait_secs)
    }
}

/// Health check configuration for service registration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// How often the registry polls the check URL
    pub interval: String,
    /// How long a check may stay critical before the registry purges the instance
    pub deregister_critical_after: String,
    /// Check path used when a registration passes an empty one
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CHECK_INTERVAL.to_string(),
            deregister_critical_after: DEFAULT_DEREGISTER_CRITICAL_AFTER.to_string(),
            path: defaults::HEALTH_CHECK_PATH.to_string(),
        }
    }
}

/// Watch subscription configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Restart a subscription that ends with an error
    pub restart_on_failure: bool,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            restart_on_failure: true,
            retry_initial_backoff_ms: defaults::WATCH_RETRY_INITIAL_BACKOFF_MS,
            retry_max_backoff_ms: defaults::WATCH_RETRY_MAX_BACKOFF_MS,
        }
    }
}

impl WatchConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_max_backoff_ms)
    }

    /// Next backoff after `current`, doubling up to the configured maximum
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff())
    }
}

impl DiscoveryConfig {
    /// Validate configuration values that cannot be expressed in the type system
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.registry.host.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "registry.host",
                "",
                "registry host must not be empty",
            ));
        }

        if self.registry.port == 0 {
            return Err(ConfigurationError::invalid_value(
                "registry.port",
                "0",
                "registry port must be greater than 0",
            ));
        }

        if self.registry.scheme != "http" && self.registry.scheme != "https" {
            return Err(ConfigurationError::invalid_value(
                "registry.scheme",
                self.registry.scheme.clone(),
                "scheme must be http or https",
            ));
        }

        if self.registry.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "registry.request_timeout_ms",
                "0",
                "request timeout must be greater than 0",
            ));
        }

        if self.registry.watch_wait_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "registry.watch_wait_secs",
                "0",
                "watch wait must be greater than 0",
            ));
        }

        for (field, value) in [
            ("health_check.interval", &self.health_check.interval),
            (
                "health_check.deregister_critical_after",
                &self.health_check.deregister_critical_after,
            ),
        ] {
            if parse_duration_string(value).is_none() {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.clone(),
                    "expected a positive duration such as 15s, 1m or 2h",
                ));
            }
        }

        if !self.health_check.path.starts_with('/') {
            return Err(ConfigurationError::invalid_value(
                "health_check.path",
                self.health_check.path.clone(),
                "check path must start with '/'",
            ));
        }

        if self.watch.retry_initial_backoff_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "watch.retry_initial_backoff_ms",
                "0",
                "initial backoff must be greater than 0",
            ));
        }

        if self.watch.retry_initial_backoff_ms > self.watch.retry_max_backoff_ms {
            return Err(ConfigurationError::invalid_value(
                "watch.retry_initial_backoff_ms",
                self.watch.retry_initial_backoff_ms.to_string(),
                format!(
                    "initial backoff exceeds retry_max_backoff_ms ({})",
                    self.watch.retry_max_backoff_ms
                ),
            ));
        }

        Ok(())
    }
}

/// Parse a registry duration string (`15s`, `1m`, `2h`) into a `Duration`.
///
/// Returns `None` for empty, zero, or unit-less values.
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.len().checked_sub(1)?;
    if !value.is_char_boundary(split) {
        return None;
    }
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;
    if amount == 0 {
        return None;
    }
    let seconds = match unit {
        "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}
