//! # Discovery Error Types
//!
//! Unified error handling for registry I/O, the discovery cache and the
//! discovery facade.

use thiserror::Error;

/// Discovery operation result type
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Errors raised by gateways, the discovery cache and discovery clients
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Registry transport error: {0}")]
    Transport(String),

    #[error("Registry returned {status}: {message}")]
    RegistryStatus { status: u16, message: String },

    #[error("Malformed registry payload: {0}")]
    Decode(String),

    #[error("No instances available for service {service}")]
    NoInstances { service: String },

    #[error("Invalid service name: {0:?}")]
    InvalidServiceName(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery cache is shutting down")]
    ShuttingDown,
}

impl DiscoveryError {
    /// Create a registry status error from an HTTP response status
    pub fn registry_status(status: u16, message: impl Into<String>) -> Self {
        Self::RegistryStatus {
            status,
            message: message.into(),
        }
    }

    /// Create a "no instances" error for a service
    pub fn no_instances(service: impl Into<String>) -> Self {
        Self::NoInstances {
            service: service.into(),
        }
    }

    /// Check if the registry may answer differently on a later attempt
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            DiscoveryError::Transport(_) => true,
            DiscoveryError::RegistryStatus { status, .. } => *status >= 500,
            DiscoveryError::NoInstances { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            DiscoveryError::Decode(error.to_string())
        } else {
            DiscoveryError::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(error: serde_json::Error) -> Self {
        DiscoveryError::Decode(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for DiscoveryError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        DiscoveryError::Configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(DiscoveryError::Transport("connection refused".into()).is_recoverable());
        assert!(DiscoveryError::registry_status(503, "leader lost").is_recoverable());
        assert!(!DiscoveryError::registry_status(403, "ACL not found").is_recoverable());
        assert!(!DiscoveryError::Decode("expected array".into()).is_recoverable());
        assert!(!DiscoveryError::ShuttingDown.is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DiscoveryError::no_instances("orders").to_string(),
            "No instances available for service orders"
        );
        assert_eq!(
            DiscoveryError::registry_status(500, "boom").to_string(),
            "Registry returned 500: boom"
        );
    }

    #[test]
    fn test_json_error_becomes_decode() {
        let err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        assert!(matches!(DiscoveryError::from(err), DiscoveryError::Decode(_)));
    }
}
