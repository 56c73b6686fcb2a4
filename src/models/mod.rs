//! # Discovery Models
//!
//! Service instances as reported by the registry and the registration
//! records submitted to it.

pub mod instance;
pub mod registration;

pub use instance::{instance_list, HealthStatus, InstanceList, ServiceInstance};
pub use registration::{new_instance_id, HealthCheckDefinition, ServiceRegistration, Weights};
