//! # Discovery Clients
//!
//! The operation surface consumed by the rest of the service: register and
//! deregister this instance, and discover instances of other services.
//!
//! ## Available Clients
//!
//! - **CachedDiscoveryClient**: discovery through the watch-refreshed [`DiscoveryCache`]
//! - **DirectDiscoveryClient**: queries the registry on every call
//!
//! Both convert an empty instance set into [`DiscoveryError::NoInstances`].
//!
//! ## Usage
//!
//! ```rust
//! use discovery_core::config::DiscoveryConfig;
//! use discovery_core::discovery::{CachedDiscoveryClient, DiscoveryClient};
//! use discovery_core::gateway::InMemoryRegistry;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CachedDiscoveryClient::new(
//!     Arc::new(InMemoryRegistry::new()),
//!     &DiscoveryConfig::default(),
//! );
//!
//! client
//!     .register("SayHello", "SayHello-1", "/health", "127.0.0.1", 10086, HashMap::new())
//!     .await;
//! let instances = client.discover_service("SayHello").await?;
//! assert_eq!(instances.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! [`DiscoveryCache`]: crate::cache::DiscoveryCache
//! [`DiscoveryError::NoInstances`]: crate::error::DiscoveryError::NoInstances

pub mod cached;
pub mod direct;

use crate::config::HealthCheckConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::gateway::RegistryGateway;
use crate::logging::{log_error, log_registry_operation};
use crate::models::{InstanceList, ServiceRegistration};
use async_trait::async_trait;
use std::collections::HashMap;

pub use cached::CachedDiscoveryClient;
pub use direct::DirectDiscoveryClient;

/// Register, deregister and discover service instances
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Register an instance with an HTTP health check on `check_path`.
    ///
    /// An empty `check_path` uses the configured `health_check.path`.
    async fn register(
        &self,
        service_name: &str,
        instance_id: &str,
        check_path: &str,
        host: &str,
        port: u16,
        meta: HashMap<String, String>,
    ) -> bool;

    /// Remove an instance; unknown ids count as success
    async fn deregister(&self, instance_id: &str) -> bool;

    /// Healthy instances of `service_name`, or `NoInstances` when there are none
    async fn discover_service(&self, service_name: &str) -> DiscoveryResult<InstanceList>;
}

/// Shared registration path for every client
#[allow(clippy::too_many_arguments)]
pub(crate) async fn register_instance(
    gateway: &dyn RegistryGateway,
    health_check: &HealthCheckConfig,
    service_name: &str,
    instance_id: &str,
    check_path: &str,
    host: &str,
    port: u16,
    meta: HashMap<String, String>,
) -> bool {
    let check_path = if check_path.is_empty() {
        health_check.path.as_str()
    } else {
        check_path
    };
    let registration =
        ServiceRegistration::new(service_name, instance_id, host, port, check_path, health_check)
            .with_meta(meta);

    match gateway.register(&registration).await {
        Ok(()) => {
            log_registry_operation(
                "register",
                Some(service_name),
                Some(instance_id),
                "success",
                Some(&registration.check.http),
            );
            true
        }
        Err(e) => {
            log_error("discovery_client", "register", &e.to_string(), Some(instance_id));
            false
        }
    }
}

pub(crate) async fn deregister_instance(gateway: &dyn RegistryGateway, instance_id: &str) -> bool {
    match gateway.deregister(instance_id).await {
        Ok(()) => {
            log_registry_operation("deregister", None, Some(instance_id), "success", None);
            true
        }
        Err(e) => {
            log_error("discovery_client", "deregister", &e.to_string(), Some(instance_id));
            false
        }
    }
}

/// An empty set is a distinguished error at this layer
pub(crate) fn require_instances(
    service_name: &str,
    instances: InstanceList,
) -> DiscoveryResult<InstanceList> {
    if instances.is_empty() {
        return Err(DiscoveryError::no_instances(service_name));
    }
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{instance_list, ServiceInstance};

    #[test]
    fn test_require_instances() {
        let empty = instance_list(Vec::new());
        assert_eq!(
            require_instances("orders", empty),
            Err(DiscoveryError::no_instances("orders"))
        );

        let one = instance_list(vec![ServiceInstance::new("orders-1", "orders", "10.0.0.5", 9000)]);
        assert_eq!(require_instances("orders", one.clone()).unwrap(), one);
    }
}
