//! Decoded store records handed to the routing table's refresh operations.
//!
//! Watchers read and decode attributes from the configuration store; the
//! table only ever sees these plain values and never performs I/O itself.

use axum::http::Method;

use crate::routing::entity::{HealthCheck, RateLimit, Status};

/// A service as described in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub accepted_methods: Vec<Method>,
    /// Names of the endpoints (`Node` ids) that make up the service.
    pub endpoints: Vec<String>,
}

/// An endpoint (`Node`) as described in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: Status,
    pub health_check_id: Option<String>,
    /// Resolved descriptor, when the health check was already complete in the store.
    pub health_check: Option<HealthCheck>,
    pub rate_limit: Option<RateLimit>,
}

/// A router as described in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterDescriptor {
    pub name: String,
    pub frontend: String,
    pub backend: String,
    pub service: String,
    pub status: Status,
    pub middlewares: Vec<String>,
}
