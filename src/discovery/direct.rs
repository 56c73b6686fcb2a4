use super::{deregister_instance, register_instance, require_instances, DiscoveryClient};
use crate::config::{DiscoveryConfig, HealthCheckConfig};
use crate::error::DiscoveryResult;
use crate::gateway::{validate_service_name, ConsulGateway, RegistryGateway};
use crate::logging::{log_discovery_operation, log_error};
use crate::models::{instance_list, InstanceList, ServiceInstance};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Uncached client: every discovery call is a registry query
#[derive(Clone)]
pub struct DirectDiscoveryClient {
    gateway: Arc<dyn RegistryGateway>,
    health_check: HealthCheckConfig,
}

impl std::fmt::Debug for DirectDiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectDiscoveryClient")
            .field("gateway", &self.gateway.gateway_name())
            .finish()
    }
}

impl DirectDiscoveryClient {
    pub fn new(gateway: Arc<dyn RegistryGateway>, config: &DiscoveryConfig) -> Self {
        Self {
            gateway,
            health_check: config.health_check.clone(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let gateway: Arc<dyn RegistryGateway> = Arc::new(ConsulGateway::new(config)?);
        Ok(Self::new(gateway, config))
    }
}

#[async_trait]
impl DiscoveryClient for DirectDiscoveryClient {
    async fn register(
        &self,
        service_name: &str,
        instance_id: &str,
        check_path: &str,
        host: &str,
        port: u16,
        meta: HashMap<String, String>,
    ) -> bool {
        register_instance(
            self.gateway.as_ref(),
            &self.health_check,
            service_name,
            instance_id,
            check_path,
            host,
            port,
            meta,
        )
        .await
    }

    async fn deregister(&self, instance_id: &str) -> bool {
        deregister_instance(self.gateway.as_ref(), instance_id).await
    }

    async fn discover_service(&self, service_name: &str) -> DiscoveryResult<InstanceList> {
        validate_service_name(service_name)?;

        let instances = self.gateway.query(service_name).await.map_err(|e| {
            log_error("discovery_client", "discover", &e.to_string(), Some(service_name));
            e
        })?;

        let healthy: Vec<ServiceInstance> = instances
            .into_iter()
            .filter(ServiceInstance::is_healthy)
            .collect();
        log_discovery_operation("discover", service_name, Some(healthy.len()), "queried", None);

        require_instances(service_name, instance_list(healthy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::gateway::InMemoryRegistry;
    use crate::models::HealthStatus;

    #[tokio::test]
    async fn test_every_call_sees_current_registry_state() {
        let registry = Arc::new(InMemoryRegistry::new());
        let client = DirectDiscoveryClient::new(registry.clone(), &DiscoveryConfig::default());

        assert_eq!(
            client.discover_service("orders").await,
            Err(DiscoveryError::no_instances("orders"))
        );

        assert!(
            client
                .register("orders", "orders-1", "/health", "10.0.0.5", 9000, HashMap::new())
                .await
        );
        assert_eq!(client.discover_service("orders").await.unwrap().len(), 1);

        registry.set_health("orders-1", HealthStatus::Critical);
        assert_eq!(
            client.discover_service("orders").await,
            Err(DiscoveryError::no_instances("orders"))
        );

        assert!(client.deregister("orders-1").await);
        assert!(client.deregister("orders-1").await);
    }
}
