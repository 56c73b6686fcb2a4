//! Registry gateway double that counts calls and lets tests push watch
//! notifications by hand.

use async_trait::async_trait;
use discovery_core::error::{DiscoveryError, DiscoveryResult};
use discovery_core::gateway::{RegistryGateway, WatchSink};
use discovery_core::models::{ServiceInstance, ServiceRegistration};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedGateway {
    instances: Mutex<HashMap<String, Vec<ServiceInstance>>>,
    sinks: Mutex<HashMap<String, WatchSink>>,
    query_delay: Mutex<Duration>,
    fail_queries: AtomicBool,
    fail_watches: AtomicBool,
    query_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    open_watches: Arc<AtomicUsize>,
    registrations: Mutex<Vec<ServiceRegistration>>,
}

/// Decrements the open watch count when the watch future is dropped
struct OpenWatch(Arc<AtomicUsize>);

impl Drop for OpenWatch {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Instances returned by `query` for `service`
    pub fn set_instances(&self, service: &str, instances: Vec<ServiceInstance>) {
        self.instances.lock().insert(service.to_string(), instances);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock() = delay;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make every new watch return a transport error immediately
    pub fn fail_watches(&self, fail: bool) {
        self.fail_watches.store(fail, Ordering::SeqCst);
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Watches whose future is still alive
    pub fn open_watches(&self) -> usize {
        self.open_watches.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self, service: &str) -> bool {
        self.sinks.lock().contains_key(service)
    }

    pub fn registrations(&self) -> Vec<ServiceRegistration> {
        self.registrations.lock().clone()
    }

    /// Deliver a notification to the watch for `service`; false if none is running
    pub fn push(&self, service: &str, instances: Vec<ServiceInstance>) -> bool {
        let sink = self.sinks.lock().get(service).cloned();
        match sink {
            Some(sink) => {
                sink(instances);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RegistryGateway for ScriptedGateway {
    async fn register(&self, registration: &ServiceRegistration) -> DiscoveryResult<()> {
        self.registrations.lock().push(registration.clone());
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> DiscoveryResult<()> {
        self.registrations.lock().retain(|r| r.id != instance_id);
        Ok(())
    }

    async fn query(&self, service_name: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.query_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Transport("registry unreachable".to_string()));
        }
        Ok(self
            .instances
            .lock()
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn watch(&self, service_name: &str, sink: WatchSink) -> DiscoveryResult<()> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_watches.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Transport("watch connection reset".to_string()));
        }

        self.open_watches.fetch_add(1, Ordering::SeqCst);
        let _open = OpenWatch(self.open_watches.clone());
        self.sinks.lock().insert(service_name.to_string(), sink);

        std::future::pending().await
    }

    fn gateway_name(&self) -> &str {
        "scripted"
    }
}

pub fn instance(service: &str, id: &str, port: u16) -> ServiceInstance {
    ServiceInstance::new(id, service, "10.0.0.5", port)
}
