use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable, shareable snapshot of a service's healthy instances
pub type InstanceList = Arc<[ServiceInstance]>;

/// Build an `InstanceList` from owned instances
pub fn instance_list(instances: Vec<ServiceInstance>) -> InstanceList {
    Arc::from(instances)
}

/// Health status derived from the registry's check results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Passing,
    Warning,
    Critical,
    Maintenance,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Passing => "passing",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Maintenance => "maintenance",
        }
    }

    /// Severity rank used when folding several checks into one status
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Passing => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
            HealthStatus::Maintenance => 3,
        }
    }

    /// Fold check statuses into one: maintenance, then critical, then warning.
    /// No checks at all counts as passing.
    pub fn aggregate<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses
            .into_iter()
            .max_by_key(|status| status.severity())
            .unwrap_or(HealthStatus::Passing)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One registered, addressable endpoint of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique per registration
    pub id: String,
    pub service: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub health: HealthStatus,
}

impl ServiceInstance {
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            address: address.into(),
            port,
            meta: HashMap::new(),
            tags: Vec::new(),
            health: HealthStatus::Passing,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Passing
    }

    /// `address:port`, suitable for building request URLs
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
