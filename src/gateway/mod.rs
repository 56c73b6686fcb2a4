//! # Registry Gateway
//!
//! Network operations against the service registry: register, deregister,
//! point-in-time queries and long-lived watch subscriptions. Gateways hold no
//! cache state; caching lives in [`crate::cache`].
//!
//! ## Available Gateways
//!
//! - **ConsulGateway**: Consul HTTP agent and health API, watches via blocking queries
//! - **InMemoryRegistry**: process-local registry with synchronous visibility
//!
//! ## Usage
//!
//! ```rust,no_run
//! use discovery_core::config::DiscoveryConfig;
//! use discovery_core::gateway::{ConsulGateway, RegistryGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = ConsulGateway::new(&DiscoveryConfig::default())?;
//! let instances = gateway.query("orders").await?;
//! # Ok(())
//! # }
//! ```

pub mod consul;
pub mod memory;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{ServiceInstance, ServiceRegistration};
use async_trait::async_trait;
use std::sync::Arc;

pub use consul::ConsulGateway;
pub use memory::InMemoryRegistry;

/// Callback invoked with the full healthy set each time it changes
pub type WatchSink = Arc<dyn Fn(Vec<ServiceInstance>) + Send + Sync>;

/// Registry operations consumed by the discovery cache and facades
#[async_trait]
pub trait RegistryGateway: Send + Sync + 'static {
    /// Submit a registration; failures are reported, never retried here
    async fn register(&self, registration: &ServiceRegistration) -> DiscoveryResult<()>;

    /// Remove an instance; an unknown id is not an error
    async fn deregister(&self, instance_id: &str) -> DiscoveryResult<()>;

    /// Currently passing instances of a service
    async fn query(&self, service_name: &str) -> DiscoveryResult<Vec<ServiceInstance>>;

    /// Deliver the healthy set to `sink` initially and on every change.
    ///
    /// Runs until the returned future is dropped or an unrecoverable error
    /// occurs. Malformed notifications are skipped without ending the watch.
    async fn watch(&self, service_name: &str, sink: WatchSink) -> DiscoveryResult<()>;

    /// Name used in logs
    fn gateway_name(&self) -> &str {
        "registry"
    }
}

/// Reject names that cannot be used as a single registry path segment
pub fn validate_service_name(service_name: &str) -> DiscoveryResult<()> {
    let invalid = service_name.is_empty()
        || service_name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '%'));

    if invalid {
        return Err(DiscoveryError::InvalidServiceName(service_name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("orders").is_ok());
        assert!(validate_service_name("string-service_v2.internal").is_ok());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name("orders/v1").is_err());
        assert!(validate_service_name("orders?passing").is_err());
        assert!(validate_service_name("two words").is_err());
    }
}
