//! # Consul Gateway
//!
//! Registry gateway speaking the Consul HTTP API.
//!
//! Registration goes through the local agent (`/v1/agent/service/...`);
//! queries and watches read `/v1/health/service/{name}`. Watches are Consul
//! blocking queries: each request carries the last seen `X-Consul-Index` and
//! the agent holds it open until the index moves or `wait` elapses.

use super::{validate_service_name, RegistryGateway, WatchSink};
use crate::config::{DiscoveryConfig, WatchConfig};
use crate::constants::consul as api;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::models::{HealthStatus, ServiceInstance, ServiceRegistration};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consul HTTP API gateway
#[derive(Clone)]
pub struct ConsulGateway {
    client: Client,
    base_url: Url,
    token: Option<String>,
    request_timeout: Duration,
    watch_wait: Duration,
    retry: WatchConfig,
}

impl std::fmt::Debug for ConsulGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulGateway")
            .field("base_url", &self.base_url.as_str())
            .field("token_configured", &self.token.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("watch_wait", &self.watch_wait)
            .finish()
    }
}

impl ConsulGateway {
    /// Create a gateway for the agent described by `config.registry`
    pub fn new(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let registry = &config.registry;
        let base_url = Url::parse(&registry.base_url()).map_err(|e| {
            DiscoveryError::Configuration(format!("Invalid registry URL: {e}"))
        })?;

        let client = Client::builder()
            .timeout(registry.request_timeout())
            .user_agent(format!("discovery-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DiscoveryError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            base_url = %base_url,
            timeout_ms = registry.request_timeout_ms,
            watch_wait_secs = registry.watch_wait_secs,
            acl_token = registry.token.is_some(),
            "Created Consul registry gateway"
        );

        Ok(Self {
            client,
            base_url,
            token: registry.token.clone().filter(|t| !t.is_empty()),
            request_timeout: registry.request_timeout(),
            watch_wait: registry.watch_wait(),
            retry: config.watch.clone(),
        })
    }

    fn url(&self, path: &str) -> DiscoveryResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DiscoveryError::Configuration(format!("Failed to construct URL: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(api::TOKEN_HEADER, token),
            None => request,
        }
    }

    /// Fetch `/v1/health/service/{name}`, blocking on `index` when given
    async fn fetch_health(
        &self,
        service_name: &str,
        index: Option<u64>,
        passing_only: bool,
    ) -> DiscoveryResult<HealthResponse> {
        let url = self.url(&format!("{}/{}", api::HEALTH_SERVICE_PATH, service_name))?;
        let mut request = self.client.get(url);

        if passing_only {
            request = request.query(&[("passing", "true")]);
        }
        if let Some(index) = index {
            let wait = format!("{}s", self.watch_wait.as_secs());
            request = request
                .query(&[("index", index.to_string()), ("wait", wait)])
                .timeout(self.watch_request_timeout());
        }

        let response = check_status(self.authorize(request).send().await?).await?;
        let index = parse_index_header(
            response
                .headers()
                .get(api::INDEX_HEADER)
                .and_then(|value| value.to_str().ok()),
        );
        let body = response.text().await?;

        Ok(HealthResponse { index, body })
    }

    /// The agent adds up to wait/16 of jitter before answering a blocking query
    fn watch_request_timeout(&self) -> Duration {
        self.watch_wait + self.watch_wait / 16 + self.request_timeout
    }
}

#[async_trait]
impl RegistryGateway for ConsulGateway {
    async fn register(&self, registration: &ServiceRegistration) -> DiscoveryResult<()> {
        let url = self.url(api::REGISTER_PATH)?;
        let body = ConsulRegistration::from(registration);

        debug!(
            service = %registration.name,
            instance_id = %registration.id,
            check = %registration.check.http,
            "Registering service instance with Consul"
        );

        let request = self.client.put(url).json(&body);
        check_status(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> DiscoveryResult<()> {
        validate_service_name(instance_id)?;
        let url = self.url(&format!("{}/{}", api::DEREGISTER_PATH, instance_id))?;

        let response = self.authorize(self.client.put(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(instance_id = %instance_id, "Instance already absent from Consul");
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn query(&self, service_name: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
        validate_service_name(service_name)?;
        let response = self.fetch_health(service_name, None, true).await?;
        let instances = decode_health_entries(&response.body)?;
        Ok(healthy_only(instances))
    }

    async fn watch(&self, service_name: &str, sink: WatchSink) -> DiscoveryResult<()> {
        validate_service_name(service_name)?;

        let mut last_index: Option<u64> = None;
        let mut last_delivered: Option<Vec<ServiceInstance>> = None;
        let mut backoff = self.retry.initial_backoff();

        loop {
            let response = match self.fetch_health(service_name, last_index, false).await {
                Ok(response) => {
                    backoff = self.retry.initial_backoff();
                    response
                }
                Err(e) if e.is_recoverable() => {
                    warn!(
                        service = %service_name,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Consul watch request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = self.retry.next_backoff(backoff);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (next_index, index_moved) = next_watch_index(last_index, response.index);
            last_index = Some(next_index);
            if !index_moved {
                continue;
            }

            let instances = match decode_health_entries(&response.body) {
                Ok(instances) => healthy_only(instances),
                Err(e) => {
                    warn!(
                        service = %service_name,
                        index = response.index,
                        error = %e,
                        "Ignoring malformed watch notification"
                    );
                    continue;
                }
            };

            if last_delivered.as_ref() == Some(&instances) {
                continue;
            }

            debug!(
                service = %service_name,
                index = response.index,
                instances = instances.len(),
                "Consul watch observed a new healthy set"
            );
            last_delivered = Some(instances.clone());
            sink(instances);
        }
    }

    fn gateway_name(&self) -> &str {
        "consul"
    }
}

struct HealthResponse {
    index: u64,
    body: String,
}

async fn check_status(response: Response) -> DiscoveryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(DiscoveryError::registry_status(status.as_u16(), message.trim()))
}

/// Missing or unparsable index headers count as 0
fn parse_index_header(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Compute the index for the next blocking query.
///
/// Returns the next index and whether the response should be treated as a
/// possible change. An index that moves backwards resets the watch; the next
/// index is never below 1 so an agent answering with 0 cannot cause a busy loop.
pub(crate) fn next_watch_index(last: Option<u64>, received: u64) -> (u64, bool) {
    match last {
        None => (received.max(1), true),
        Some(last) if received == last => (last, false),
        Some(last) if received < last => (1, true),
        Some(_) => (received.max(1), true),
    }
}

/// Decode a `/v1/health/service` body into instances with aggregated health
pub(crate) fn decode_health_entries(body: &str) -> DiscoveryResult<Vec<ServiceInstance>> {
    let entries: Vec<HealthEntry> = serde_json::from_str(body)?;
    Ok(entries.into_iter().map(HealthEntry::into_instance).collect())
}

fn healthy_only(instances: Vec<ServiceInstance>) -> Vec<ServiceInstance> {
    instances
        .into_iter()
        .filter(ServiceInstance::is_healthy)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    #[serde(default)]
    node: Option<NodeEntry>,
    service: AgentService,
    #[serde(default)]
    checks: Vec<CheckEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeEntry {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CheckEntry {
    #[serde(rename = "CheckID", default)]
    check_id: String,
    status: String,
}

impl CheckEntry {
    fn health(&self) -> HealthStatus {
        if self.check_id == api::NODE_MAINTENANCE_CHECK
            || self.check_id.starts_with(api::SERVICE_MAINTENANCE_PREFIX)
        {
            return HealthStatus::Maintenance;
        }
        match self.status.as_str() {
            api::STATUS_PASSING => HealthStatus::Passing,
            api::STATUS_WARNING => HealthStatus::Warning,
            api::STATUS_MAINTENANCE => HealthStatus::Maintenance,
            // critical and anything unknown
            _ => HealthStatus::Critical,
        }
    }
}

impl HealthEntry {
    fn into_instance(self) -> ServiceInstance {
        let health = HealthStatus::aggregate(self.checks.iter().map(CheckEntry::health));
        let address = if self.service.address.is_empty() {
            self.node.map(|node| node.address).unwrap_or_default()
        } else {
            self.service.address
        };

        ServiceInstance {
            id: self.service.id,
            service: self.service.service,
            address,
            port: self.service.port,
            meta: self.service.meta.unwrap_or_default(),
            tags: self.service.tags.unwrap_or_default(),
            health,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: &'a [String],
    address: &'a str,
    port: u16,
    meta: &'a HashMap<String, String>,
    enable_tag_override: bool,
    check: ConsulCheck<'a>,
    weights: ConsulWeights,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulCheck<'a> {
    #[serde(rename = "HTTP")]
    http: &'a str,
    interval: &'a str,
    deregister_critical_service_after: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulWeights {
    passing: u32,
    warning: u32,
}

impl<'a> From<&'a ServiceRegistration> for ConsulRegistration<'a> {
    fn from(registration: &'a ServiceRegistration) -> Self {
        Self {
            id: &registration.id,
            name: &registration.name,
            tags: &registration.tags,
            address: &registration.address,
            port: registration.port,
            meta: &registration.meta,
            enable_tag_override: registration.enable_tag_override,
            check: ConsulCheck {
                http: &registration.check.http,
                interval: &registration.check.interval,
                deregister_critical_service_after: &registration.check.deregister_critical_after,
            },
            weights: ConsulWeights {
                passing: registration.weights.passing,
                warning: registration.weights.warning,
            },
        }
    }
}
