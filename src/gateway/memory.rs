//! # In-Memory Registry
//!
//! Process-local registry gateway. Registrations are visible to queries
//! immediately and every mutation wakes the active watches, which makes it a
//! drop-in registry for tests and single-process development setups.

use super::{validate_service_name, RegistryGateway, WatchSink};
use crate::error::DiscoveryResult;
use crate::models::{HealthStatus, ServiceInstance, ServiceRegistration};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::debug;

/// Registry kept entirely in memory
#[derive(Debug)]
pub struct InMemoryRegistry {
    /// Instances keyed by id; ordered so snapshots compare deterministically
    instances: RwLock<BTreeMap<String, ServiceInstance>>,
    /// Bumped on every mutation
    revision: watch::Sender<u64>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            instances: RwLock::new(BTreeMap::new()),
            revision,
        }
    }

    /// Change the health of a registered instance; returns false for unknown ids
    pub fn set_health(&self, instance_id: &str, health: HealthStatus) -> bool {
        let updated = {
            let mut instances = self.instances.write();
            match instances.get_mut(instance_id) {
                Some(instance) => {
                    instance.health = health;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.bump();
        }
        updated
    }

    /// Number of registered instances across all services
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    fn healthy_snapshot(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.instances
            .read()
            .values()
            .filter(|instance| instance.service == service_name && instance.is_healthy())
            .cloned()
            .collect()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[async_trait]
impl RegistryGateway for InMemoryRegistry {
    async fn register(&self, registration: &ServiceRegistration) -> DiscoveryResult<()> {
        validate_service_name(&registration.name)?;
        self.instances
            .write()
            .insert(registration.id.clone(), registration.to_instance());
        self.bump();

        debug!(
            service = %registration.name,
            instance_id = %registration.id,
            "Registered instance in memory"
        );
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> DiscoveryResult<()> {
        let removed = self.instances.write().remove(instance_id).is_some();
        if removed {
            self.bump();
        }
        Ok(())
    }

    async fn query(&self, service_name: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
        validate_service_name(service_name)?;
        Ok(self.healthy_snapshot(service_name))
    }

    async fn watch(&self, service_name: &str, sink: WatchSink) -> DiscoveryResult<()> {
        validate_service_name(service_name)?;
        let mut changes = self.revision.subscribe();
        let mut last_delivered: Option<Vec<ServiceInstance>> = None;

        loop {
            let current = self.healthy_snapshot(service_name);
            if last_delivered.as_ref() != Some(&current) {
                last_delivered = Some(current.clone());
                sink(current);
            }
            if changes.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    fn gateway_name(&self) -> &str {
        "in-memory"
    }
}
