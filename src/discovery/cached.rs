use super::{deregister_instance, register_instance, require_instances, DiscoveryClient};
use crate::cache::{CacheStats, DiscoveryCache};
use crate::config::{DiscoveryConfig, HealthCheckConfig};
use crate::error::DiscoveryResult;
use crate::gateway::{ConsulGateway, RegistryGateway};
use crate::logging::log_discovery_operation;
use crate::models::InstanceList;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Discovery client backed by the watch-refreshed discovery cache.
///
/// Registration calls go straight to the gateway; discovery goes through
/// the cache and only reaches the registry on a name's first lookup.
#[derive(Clone)]
pub struct CachedDiscoveryClient {
    gateway: Arc<dyn RegistryGateway>,
    cache: Arc<DiscoveryCache>,
    health_check: HealthCheckConfig,
}

impl std::fmt::Debug for CachedDiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDiscoveryClient")
            .field("gateway", &self.gateway.gateway_name())
            .field("cache", &self.cache)
            .finish()
    }
}

impl CachedDiscoveryClient {
    pub fn new(gateway: Arc<dyn RegistryGateway>, config: &DiscoveryConfig) -> Self {
        let cache = Arc::new(DiscoveryCache::new(gateway.clone(), config.watch.clone()));
        Self {
            gateway,
            cache,
            health_check: config.health_check.clone(),
        }
    }

    /// Client talking to the Consul agent described by `config`
    pub fn from_config(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let gateway: Arc<dyn RegistryGateway> = Arc::new(ConsulGateway::new(config)?);
        Ok(Self::new(gateway, config))
    }

    /// The cache shared by every clone of this client
    pub fn cache(&self) -> &Arc<DiscoveryCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.cache_stats()
    }

    /// Stop all watch subscriptions; call once on process shutdown
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }
}

#[async_trait]
impl DiscoveryClient for CachedDiscoveryClient {
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
        let instances = self.cache.lookup(service_name).await?;
        let count = instances.len();
        let result = require_instances(service_name, instances);
        if result.is_err() {
            log_discovery_operation("discover", service_name, Some(count), "no_instances", None);
        }
        result
    }
}
