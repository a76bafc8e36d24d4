//! Error taxonomy for the routing core.
//!
//! Routing-table operations return [`RoutingError`] synchronously and never
//! panic on domain violations. Store access fails with [`StoreError`].
//! Watcher handlers surface both through [`WatchError`].

use thiserror::Error;

/// Domain errors raised by the routing table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// An entity with the same identity is already registered.
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// The entity is not registered.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A required field is empty at construction time.
    #[error("incomplete {kind}: missing {field}")]
    IncompleteObject { kind: &'static str, field: &'static str },

    /// The router is serving live traffic and cannot be mutated.
    #[error("router is online: {0}")]
    RouterOnline(String),

    /// An online router still references the service.
    #[error("service is in use by an online router: {0}")]
    ServiceInUse(String),

    /// The service bound to the router has no online endpoint.
    #[error("service has no online endpoint: {0}")]
    NoOnlineEndpoint(String),

    /// An endpoint could not be inserted into the endpoint registry.
    #[error("failed to reconcile endpoint {endpoint} into the registry")]
    ReconciliationFailed { endpoint: String },

    /// Two registries disagree about the same key.
    #[error("routing table data mapping error at {0}")]
    DataMappingError(String),

    /// The router is already in the online subset.
    #[error("router already online: {0}")]
    AlreadyOnline(String),

    /// A change-event key does not follow the key layout.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl RoutingError {
    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound { kind, key: key.into() }
    }

    pub(crate) fn already_exists(kind: &'static str, key: impl Into<String>) -> Self {
        Self::AlreadyExists { kind, key: key.into() }
    }

    /// Stable numeric code, kept compatible with the gateway's error catalog.
    pub fn code(&self) -> u16 {
        match self {
            RoutingError::AlreadyExists { .. } => 20,
            RoutingError::NotFound { .. } => 25,
            RoutingError::IncompleteObject { .. } => 26,
            RoutingError::RouterOnline(_) => 32,
            RoutingError::NoOnlineEndpoint(_) => 33,
            RoutingError::ReconciliationFailed { .. } => 34,
            RoutingError::DataMappingError(_) => 35,
            RoutingError::AlreadyOnline(_) => 36,
            RoutingError::ServiceInUse(_) => 38,
            RoutingError::InvalidKey(_) => 200,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingError::AlreadyExists { .. } => "already_exists",
            RoutingError::NotFound { .. } => "not_found",
            RoutingError::IncompleteObject { .. } => "incomplete_object",
            RoutingError::RouterOnline(_) => "router_online",
            RoutingError::ServiceInUse(_) => "service_in_use",
            RoutingError::NoOnlineEndpoint(_) => "no_online_endpoint",
            RoutingError::ReconciliationFailed { .. } => "reconciliation_failed",
            RoutingError::DataMappingError(_) => "data_mapping_error",
            RoutingError::AlreadyOnline(_) => "already_online",
            RoutingError::InvalidKey(_) => "invalid_key",
        }
    }
}

/// Errors raised by a configuration store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("cannot decode {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("store watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Errors returned by watcher event handlers.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The watcher was started before a routing table was bound to it.
    #[error("{0} watcher is not bound to a routing table")]
    Unbound(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RoutingError::already_exists("router", "/a"),
            RoutingError::not_found("router", "/a"),
            RoutingError::IncompleteObject { kind: "router", field: "frontend_api" },
            RoutingError::RouterOnline("/a".into()),
            RoutingError::ServiceInUse("svc".into()),
            RoutingError::NoOnlineEndpoint("svc".into()),
            RoutingError::ReconciliationFailed { endpoint: "ep".into() },
            RoutingError::DataMappingError("/a".into()),
            RoutingError::AlreadyOnline("/a".into()),
            RoutingError::InvalidKey("/x".into()),
        ];
        let mut codes: Vec<u16> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_watch_error_wraps_routing() {
        let err: WatchError = RoutingError::InvalidKey("/Service/bad".into()).into();
        assert_eq!(err.to_string(), "invalid key: /Service/bad");
    }
}
