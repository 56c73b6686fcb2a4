//! # Discovery Cache
//!
//! Resolves a service name into its healthy instances and keeps the answer
//! fresh through registry watch subscriptions instead of querying per call.
//!
//! ## Lookup Protocol
//!
//! ```text
//! lookup(name)
//!   ├── entry present?  ──yes──> return it               (no lock, no I/O)
//!   └── miss_lock
//!         ├── entry present?  ──yes──> return it
//!         └── query gateway ──> store result (empty on error)
//!             └── spawn the one watch task for `name`
//! ```
//!
//! The check-and-create sequence runs as a single critical section, so racing
//! first lookups for a name issue one query and start one watch. Every watch
//! notification overwrites the entry, including with an empty set.
//!
//! ## Usage
//!
//! ```rust
//! use discovery_core::cache::DiscoveryCache;
//! use discovery_core::config::WatchConfig;
//! use discovery_core::gateway::InMemoryRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = DiscoveryCache::new(Arc::new(InMemoryRegistry::new()), WatchConfig::default());
//!
//! let instances = cache.lookup("orders").await?;
//! println!("{} healthy orders instances", instances.len());
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod subscriptions;

pub use subscriptions::SubscriptionInfo;

use crate::config::WatchConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::gateway::{validate_service_name, RegistryGateway, WatchSink};
use crate::logging::log_error;
use crate::models::{instance_list, InstanceList, ServiceInstance};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use subscriptions::SubscriptionRegistry;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Cache-wide counters
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    fallback_queries: AtomicU64,
    fallback_failures: AtomicU64,
    watch_updates: AtomicU64,
    watch_restarts: AtomicU64,
}

/// Statistics about the discovery cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_services: usize,
    pub active_subscriptions: usize,
    pub hits: u64,
    pub misses: u64,
    pub fallback_queries: u64,
    pub fallback_failures: u64,
    pub watch_updates: u64,
    pub watch_restarts: u64,
}

/// Watch-refreshed cache of healthy instances per service name
pub struct DiscoveryCache {
    gateway: Arc<dyn RegistryGateway>,
    entries: Arc<DashMap<String, InstanceList>>,
    /// Serializes the miss path; never taken on a hit
    miss_lock: Mutex<()>,
    subscriptions: SubscriptionRegistry,
    watch_config: WatchConfig,
    counters: Arc<CacheCounters>,
}

impl std::fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("gateway", &self.gateway.gateway_name())
            .field("cached_services", &self.entries.len())
            .field("subscriptions", &self.subscriptions)
            .field("watch_config", &self.watch_config)
            .finish()
    }
}

impl DiscoveryCache {
    /// Create an empty cache over `gateway`
    pub fn new(gateway: Arc<dyn RegistryGateway>, watch_config: WatchConfig) -> Self {
        info!(
            gateway = gateway.gateway_name(),
            restart_on_failure = watch_config.restart_on_failure,
            "Discovery cache initialized"
        );

        Self {
            gateway,
            entries: Arc::new(DashMap::new()),
            miss_lock: Mutex::new(()),
            subscriptions: SubscriptionRegistry::new(),
            watch_config,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Resolve `service_name` into its healthy instances.
    ///
    /// Served from the cache once an entry exists. On the first lookup the
    /// registry is queried and a background watch is started; if that query
    /// fails this call returns the error, the entry is stored as empty, and
    /// the watch still runs so later lookups recover with the registry.
    pub async fn lookup(&self, service_name: &str) -> DiscoveryResult<InstanceList> {
        validate_service_name(service_name)?;

        if let Some(instances) = self.peek(service_name) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(instances);
        }

        let _miss_guard = self.miss_lock.lock().await;

        // Another caller may have populated the entry while we waited
        if let Some(instances) = self.peek(service_name) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(instances);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        // An entry created now would have no watch behind it and never refresh
        if self.subscriptions.is_shutting_down() {
            return Err(DiscoveryError::ShuttingDown);
        }
        self.counters.fallback_queries.fetch_add(1, Ordering::Relaxed);

        let queried = self.gateway.query(service_name).await;

        // Shutdown may have begun while the query was in flight
        if self.subscriptions.is_shutting_down() {
            debug!(service = %service_name, "Shutting down, discarding query result");
            return Err(DiscoveryError::ShuttingDown);
        }

        let outcome = match queried {
            Ok(instances) => {
                let instances = instance_list(healthy(instances));
                self.entries.insert(service_name.to_string(), instances.clone());
                debug!(
                    service = %service_name,
                    instances = instances.len(),
                    "Cache miss resolved by registry query"
                );
                Ok(instances)
            }
            Err(e) => {
                self.counters.fallback_failures.fetch_add(1, Ordering::Relaxed);
                self.entries.insert(service_name.to_string(), instance_list(Vec::new()));
                log_error(
                    "discovery_cache",
                    "lookup",
                    &e.to_string(),
                    Some(service_name),
                );
                Err(e)
            }
        };

        self.start_subscription(service_name);
        outcome
    }

    /// Cached entry for `service_name`, without touching the registry
    pub fn peek(&self, service_name: &str) -> Option<InstanceList> {
        self.entries
            .get(service_name)
            .map(|entry| entry.value().clone())
    }

    /// Names with a cache entry
    pub fn cached_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Names whose watch subscription is running
    pub fn active_subscriptions(&self) -> Vec<String> {
        self.subscriptions.active()
    }

    /// Per-service subscription details
    pub fn subscription_details(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.details()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            cached_services: self.entries.len(),
            active_subscriptions: self.subscriptions.active().len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fallback_queries: self.counters.fallback_queries.load(Ordering::Relaxed),
            fallback_failures: self.counters.fallback_failures.load(Ordering::Relaxed),
            watch_updates: self.counters.watch_updates.load(Ordering::Relaxed),
            watch_restarts: self.counters.watch_restarts.load(Ordering::Relaxed),
        }
    }

    /// Stop every watch subscription and wait for them to release their connections.
    ///
    /// Cached entries stay readable; misses after shutdown fail with
    /// [`DiscoveryError::ShuttingDown`].
    pub async fn shutdown(&self) {
        self.subscriptions.signal_shutdown();
        // Wait out any miss in progress; it observes the signal before caching
        drop(self.miss_lock.lock().await);

        let active = self.subscriptions.active().len();
        self.subscriptions.shutdown().await;
        info!(stopped_subscriptions = active, "Discovery cache shut down");
    }

    /// Must be called with `miss_lock` held
    fn start_subscription(&self, service_name: &str) {
        if self.subscriptions.contains(service_name) {
            return;
        }

        let subscription = WatchSubscription {
            service: service_name.to_string(),
            gateway: self.gateway.clone(),
            entries: self.entries.clone(),
            counters: self.counters.clone(),
            config: self.watch_config.clone(),
            shutdown: self.subscriptions.shutdown_signal(),
        };
        let handle = tokio::spawn(subscription.run());
        self.subscriptions.insert(service_name, handle);

        info!(
            service = %service_name,
            gateway = self.gateway.gateway_name(),
            "Started watch subscription"
        );
    }
}

fn healthy(instances: Vec<ServiceInstance>) -> Vec<ServiceInstance> {
    instances
        .into_iter()
        .filter(ServiceInstance::is_healthy)
        .collect()
}

/// State moved into a background watch task
struct WatchSubscription {
    service: String,
    gateway: Arc<dyn RegistryGateway>,
    entries: Arc<DashMap<String, InstanceList>>,
    counters: Arc<CacheCounters>,
    config: WatchConfig,
    shutdown: watch::Receiver<bool>,
}

impl WatchSubscription {
    async fn run(mut self) {
        let mut backoff = self.config.initial_backoff();

        loop {
            let delivered = Arc::new(AtomicBool::new(false));
            let sink = self.sink(delivered.clone());

            let result = tokio::select! {
                result = self.gateway.watch(&self.service, sink) => result,
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    debug!(service = %self.service, "Watch subscription stopping");
                    return;
                }
            };

            match result {
                Ok(()) => warn!(service = %self.service, "Watch subscription ended"),
                Err(e) => warn!(
                    service = %self.service,
                    error = %e,
                    "Watch subscription failed"
                ),
            }

            if !self.config.restart_on_failure {
                warn!(
                    service = %self.service,
                    "Watch restart disabled, entry keeps its last known instances"
                );
                return;
            }

            if delivered.load(Ordering::Relaxed) {
                backoff = self.config.initial_backoff();
            }
            self.counters.watch_restarts.fetch_add(1, Ordering::Relaxed);
            info!(
                service = %self.service,
                backoff_ms = backoff.as_millis() as u64,
                "Restarting watch subscription"
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => return,
            }
            backoff = self.config.next_backoff(backoff);
        }
    }

    /// Callback that overwrites the entry with every notification
    fn sink(&self, delivered: Arc<AtomicBool>) -> WatchSink {
        let service = self.service.clone();
        let entries = self.entries.clone();
        let counters = self.counters.clone();

        Arc::new(move |instances: Vec<ServiceInstance>| {
            let instances = healthy(instances);
            let count = instances.len();
            entries.insert(service.clone(), instance_list(instances));
            counters.watch_updates.fetch_add(1, Ordering::Relaxed);
            delivered.store(true, Ordering::Relaxed);
            debug!(service = %service, instances = count, "Watch update stored");
        })
    }
}

/// Resolves once shutdown is signalled or the cache is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HealthStatus, ServiceRegistration};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Gateway whose query always fails and whose watch never delivers
    struct UnreachableGateway;

    #[async_trait]
    impl RegistryGateway for UnreachableGateway {
        async fn register(&self, _: &ServiceRegistration) -> DiscoveryResult<()> {
            Err(DiscoveryError::Transport("connection refused".into()))
        }

        async fn deregister(&self, _: &str) -> DiscoveryResult<()> {
            Err(DiscoveryError::Transport("connection refused".into()))
        }

        async fn query(&self, _: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
            Err(DiscoveryError::Transport("connection refused".into()))
        }

        async fn watch(&self, _: &str, _: WatchSink) -> DiscoveryResult<()> {
            std::future::pending().await
        }
    }

    fn fast_watch_config() -> WatchConfig {
        WatchConfig {
            restart_on_failure: true,
            retry_initial_backoff_ms: 10,
            retry_max_backoff_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_failed_first_lookup_caches_empty_and_keeps_watching() {
        let cache = DiscoveryCache::new(Arc::new(UnreachableGateway), fast_watch_config());

        let first = cache.lookup("orders").await;
        assert!(matches!(first, Err(DiscoveryError::Transport(_))));

        // The failure is reported once; the cached empty set is served afterwards
        let second = cache.lookup("orders").await.unwrap();
        assert!(second.is_empty());
        assert_eq!(cache.active_subscriptions(), vec!["orders".to_string()]);

        let stats = cache.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.fallback_failures, 1);

        cache.shutdown().await;
        assert!(cache.active_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_service_name_is_rejected_without_caching() {
        let cache = DiscoveryCache::new(Arc::new(UnreachableGateway), fast_watch_config());
        assert!(matches!(
            cache.lookup("").await,
            Err(DiscoveryError::InvalidServiceName(_))
        ));
        assert!(cache.cached_services().is_empty());
        assert!(cache.active_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_after_shutdown_serves_only_cached_entries() {
        let registry = Arc::new(crate::gateway::InMemoryRegistry::new());
        let cache = DiscoveryCache::new(registry, fast_watch_config());

        assert!(cache.lookup("orders").await.unwrap().is_empty());
        cache.shutdown().await;

        assert!(cache.lookup("orders").await.unwrap().is_empty());
        assert_eq!(cache.lookup("billing").await, Err(DiscoveryError::ShuttingDown));
        assert_eq!(cache.cached_services(), vec!["orders".to_string()]);
        assert!(cache.subscription_details().is_empty());
        assert_eq!(cache.cache_stats().fallback_queries, 1);
    }

    #[tokio::test]
    async fn test_watch_updates_filter_unhealthy_instances() {
        let registry = Arc::new(crate::gateway::InMemoryRegistry::new());
        let cache = DiscoveryCache::new(registry.clone(), fast_watch_config());

        assert!(cache.lookup("orders").await.unwrap().is_empty());

        let registration = ServiceRegistration::new(
            "orders",
            "orders-1",
            "10.0.0.5",
            9000,
            "/health",
            &crate::config::HealthCheckConfig::default(),
        );
        registry.register(&registration).await.unwrap();

        let refreshed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if cache.peek("orders").is_some_and(|list| list.len() == 1) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(refreshed.is_ok(), "watch update never reached the cache");

        registry.set_health("orders-1", HealthStatus::Warning);
        let emptied = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if cache.peek("orders").is_some_and(|list| list.is_empty()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(emptied.is_ok(), "unhealthy instance stayed cached");

        cache.shutdown().await;
    }
}
