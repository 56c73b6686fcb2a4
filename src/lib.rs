#![allow(clippy::doc_markdown)] // Allow technical terms like Consul, DashMap in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Discovery Core Rust
//!
//! Service discovery client with a watch-refreshed local cache.
//!
//! ## Overview
//!
//! Services register themselves with a registry (Consul) together with an
//! HTTP health check, and resolve other services by name into their currently
//! healthy instances. Resolution is served from an in-process cache; each
//! service name is fetched from the registry once and then kept current by a
//! single background watch subscription.
//!
//! ## Module Organization
//!
//! - [`gateway`] - Registry network operations (Consul, in-memory)
//! - [`cache`] - Lookup cache with one watch subscription per service name
//! - [`discovery`] - Register / deregister / discover facade clients
//! - [`config`] - Layered TOML + environment configuration
//! - [`models`] - Service instances and registration payloads
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use discovery_core::config::ConfigManager;
//! use discovery_core::discovery::{CachedDiscoveryClient, DiscoveryClient};
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! discovery_core::logging::init_structured_logging();
//!
//! let manager = ConfigManager::load()?;
//! let client = CachedDiscoveryClient::from_config(manager.config())?;
//!
//! client
//!     .register("orders", "orders-1", "/health", "10.0.0.5", 9000, HashMap::new())
//!     .await;
//!
//! for instance in client.discover_service("billing").await?.iter() {
//!     println!("billing at {}", instance.endpoint());
//! }
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;

pub use cache::{CacheStats, DiscoveryCache, SubscriptionInfo};
pub use config::{ConfigManager, DiscoveryConfig, HealthCheckConfig, RegistryConfig, WatchConfig};
pub use discovery::{CachedDiscoveryClient, DirectDiscoveryClient, DiscoveryClient};
pub use error::{DiscoveryError, DiscoveryResult};
pub use gateway::{ConsulGateway, InMemoryRegistry, RegistryGateway, WatchSink};
pub use models::{HealthStatus, InstanceList, ServiceInstance, ServiceRegistration};
