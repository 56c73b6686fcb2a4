//! Per-service watch subscription tracking.
//!
//! One entry per service name for which a background watch was started. The
//! entry is never removed while the cache is running, which is what keeps a
//! second watch from ever being spawned for the same name.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
struct Subscription {
    handle: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

/// Snapshot of one tracked subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub service: String,
    pub started_at: DateTime<Utc>,
    pub running: bool,
}

#[derive(Debug)]
pub(crate) struct SubscriptionRegistry {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    shutdown: watch::Sender<bool>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub(crate) fn contains(&self, service: &str) -> bool {
        self.subscriptions.lock().contains_key(service)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver that flips to `true` when shutdown begins
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Track a freshly spawned watch task.
    ///
    /// Callers hold the cache's miss lock and check `contains` first, so a
    /// duplicate here is a bug; the newer task is aborted to keep one watch.
    pub(crate) fn insert(&self, service: &str, handle: JoinHandle<()>) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(service) {
            warn!(service = %service, "Duplicate watch subscription aborted");
            handle.abort();
            return;
        }
        subscriptions.insert(
            service.to_string(),
            Subscription {
                handle,
                started_at: Utc::now(),
            },
        );
    }

    /// Names whose watch task is still running
    pub(crate) fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(_, subscription)| !subscription.handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn details(&self) -> Vec<SubscriptionInfo> {
        let mut details: Vec<SubscriptionInfo> = self
            .subscriptions
            .lock()
            .iter()
            .map(|(name, subscription)| SubscriptionInfo {
                service: name.clone(),
                started_at: subscription.started_at,
                running: !subscription.handle.is_finished(),
            })
            .collect();
        details.sort_by(|a, b| a.service.cmp(&b.service));
        details
    }

    /// Flip the shutdown signal without waiting for watch tasks
    pub(crate) fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Signal every watch task to stop and wait for them to finish
    pub(crate) async fn shutdown(&self) {
        self.signal_shutdown();

        let drained: Vec<(String, Subscription)> = self.subscriptions.lock().drain().collect();
        let stopped = join_all(
            drained
                .into_iter()
                .map(|(service, subscription)| async move { (service, subscription.handle.await) }),
        )
        .await;

        for (service, result) in stopped {
            match result {
                Ok(()) => debug!(service = %service, "Watch subscription stopped"),
                Err(e) if e.is_cancelled() => {
                    debug!(service = %service, "Watch subscription cancelled")
                }
                Err(e) => warn!(service = %service, error = %e, "Watch subscription panicked"),
            }
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        for subscription in self.subscriptions.get_mut().values() {
            subscription.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_stops_tracked_tasks() {
        let registry = SubscriptionRegistry::new();
        let mut signal = registry.shutdown_signal();
        let handle = tokio::spawn(async move {
            let _ = signal.wait_for(|stop| *stop).await;
        });

        registry.insert("orders", handle);
        assert!(registry.contains("orders"));
        assert_eq!(registry.active(), vec!["orders".to_string()]);
        assert!(!registry.is_shutting_down());

        registry.shutdown().await;
        assert!(registry.is_shutting_down());
        assert!(registry.active().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_first_task() {
        let registry = SubscriptionRegistry::new();
        let first = tokio::spawn(std::future::pending::<()>());
        let second = tokio::spawn(std::future::pending::<()>());

        registry.insert("orders", first);
        registry.insert("orders", second);

        let details = registry.details();
        assert_eq!(details.len(), 1);
        assert!(details[0].running);
    }
}
