//! # System Constants
//!
//! Registry protocol constants and configuration defaults shared by the
//! gateways, the discovery cache and the configuration loader.

/// Environment variable selecting the configuration environment
pub const ENVIRONMENT_VARIABLE: &str = "DISCOVERY_ENV";

/// Prefix for configuration environment variables (`DISCOVERY_REGISTRY__PORT`)
pub const CONFIG_ENV_PREFIX: &str = "DISCOVERY";

/// Configuration file stem (`discovery.toml`, `discovery.{env}.toml`)
pub const CONFIG_FILE_STEM: &str = "discovery";

/// Registry health check poll interval
pub const DEFAULT_CHECK_INTERVAL: &str = "15s";

/// Window after which a critical instance is purged by the registry
pub const DEFAULT_DEREGISTER_CRITICAL_AFTER: &str = "30s";

/// Load-balancing weights attached to every registration
pub mod weights {
    pub const PASSING: u32 = 10;
    pub const WARNING: u32 = 1;
}

/// Consul HTTP API paths and headers
pub mod consul {
    pub const REGISTER_PATH: &str = "/v1/agent/service/register";
    pub const DEREGISTER_PATH: &str = "/v1/agent/service/deregister";
    pub const HEALTH_SERVICE_PATH: &str = "/v1/health/service";
    pub const INDEX_HEADER: &str = "X-Consul-Index";
    pub const TOKEN_HEADER: &str = "X-Consul-Token";

    /// Check status strings reported by `/v1/health/service`
    pub const STATUS_PASSING: &str = "passing";
    pub const STATUS_WARNING: &str = "warning";
    pub const STATUS_CRITICAL: &str = "critical";
    pub const STATUS_MAINTENANCE: &str = "maintenance";

    /// Check ID prefixes used for node and service maintenance mode
    pub const NODE_MAINTENANCE_CHECK: &str = "_node_maintenance";
    pub const SERVICE_MAINTENANCE_PREFIX: &str = "_service_maintenance:";
}

/// Configuration defaults
pub mod defaults {
    pub const REGISTRY_HOST: &str = "127.0.0.1";
    pub const REGISTRY_PORT: u16 = 8500;
    pub const REQUEST_TIMEOUT_MS: u64 = 5_000;
    pub const WATCH_WAIT_SECS: u64 = 300;
    pub const HEALTH_CHECK_PATH: &str = "/health";
    pub const WATCH_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
    pub const WATCH_RETRY_MAX_BACKOFF_MS: u64 = 30_000;
}
