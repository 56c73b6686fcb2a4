use crate::config::HealthCheckConfig;
use crate::constants::weights;
use crate::models::instance::{HealthStatus, ServiceInstance};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Generate a registration id of the form `{service}-{uuid}`
pub fn new_instance_id(service_name: &str) -> String {
    format!("{}-{}", service_name, Uuid::new_v4())
}

/// HTTP health check the registry runs against a registered instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckDefinition {
    /// Full check URL, `http://{host}:{port}{path}`
    pub http: String,
    pub interval: String,
    /// The registry purges the instance once the check stays critical this long
    pub deregister_critical_after: String,
}

impl HealthCheckDefinition {
    pub fn http(host: &str, port: u16, path: &str, config: &HealthCheckConfig) -> Self {
        Self {
            http: format!("http://{host}:{port}{path}"),
            interval: config.interval.clone(),
            deregister_critical_after: config.deregister_critical_after.clone(),
        }
    }
}

/// Load-balancing weights advertised with a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub passing: u32,
    pub warning: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            passing: weights::PASSING,
            warning: weights::WARNING,
        }
    }
}

/// Registration record submitted to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub meta: HashMap<String, String>,
    pub tags: Vec<String>,
    pub enable_tag_override: bool,
    pub check: HealthCheckDefinition,
    pub weights: Weights,
}

impl ServiceRegistration {
    /// Registration with an HTTP check on `check_path` and the configured timings
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        check_path: &str,
        health_check: &HealthCheckConfig,
    ) -> Self {
        let address = address.into();
        let check = HealthCheckDefinition::http(&address, port, check_path, health_check);
        Self {
            id: id.into(),
            name: name.into(),
            address,
            port,
            meta: HashMap::new(),
            tags: Vec::new(),
            enable_tag_override: false,
            check,
            weights: Weights::default(),
        }
    }

    pub fn with_meta(mut self, meta: HashMap<String, String>) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Instance as the registry would report it once its check passes
    pub fn to_instance(&self) -> ServiceInstance {
        ServiceInstance {
            id: self.id.clone(),
            service: self.name.clone(),
            address: self.address.clone(),
            port: self.port,
            meta: self.meta.clone(),
            tags: self.tags.clone(),
            health: HealthStatus::Passing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_builds_http_check() {
        let registration = ServiceRegistration::new(
            "SayHello",
            "SayHello-1",
            "127.0.0.1",
            10086,
            "/health",
            &HealthCheckConfig::default(),
        );

        assert_eq!(registration.check.http, "http://127.0.0.1:10086/health");
        assert_eq!(registration.check.interval, "15s");
        assert_eq!(registration.check.deregister_critical_after, "30s");
        assert_eq!(registration.weights, Weights { passing: 10, warning: 1 });
        assert!(!registration.enable_tag_override);
    }

    #[test]
    fn test_new_instance_id_is_unique_and_prefixed() {
        let first = new_instance_id("orders");
        let second = new_instance_id("orders");
        assert!(first.starts_with("orders-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_to_instance_carries_metadata() {
        let meta = HashMap::from([("version".to_string(), "1.2.0".to_string())]);
        let instance = ServiceRegistration::new(
            "orders",
            "orders-1",
            "10.0.0.5",
            9000,
            "/health",
            &HealthCheckConfig::default(),
        )
        .with_meta(meta.clone())
        .to_instance();

        assert_eq!(instance.id, "orders-1");
        assert_eq!(instance.service, "orders");
        assert_eq!(instance.meta, meta);
        assert!(instance.is_healthy());
    }
}
