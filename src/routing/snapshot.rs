//! Serializable point-in-time views of the routing table.

use serde::Serialize;

use crate::routing::endpoint::Endpoint;
use crate::routing::entity::{HealthCheck, RateLimit, Status};
use crate::routing::router::Router;
use crate::routing::service::Service;

#[derive(Debug, Clone, Serialize)]
pub struct RouterView {
    /// Routing-table key the router is registered under.
    pub path: String,
    pub name: String,
    pub status: Status,
    /// `None` once the frontend api has been detached.
    pub frontend: Option<String>,
    pub backend: String,
    /// `None` once the service has been removed.
    pub service: Option<String>,
    pub middlewares: Vec<String>,
    pub online: bool,
}

impl RouterView {
    pub(crate) fn new(path: &str, router: &Router, online: bool) -> Self {
        Self {
            path: path.to_string(),
            name: router.key().to_string(),
            status: router.status(),
            frontend: router.frontend().map(|f| f.key().to_string()),
            backend: router.backend().key().to_string(),
            service: router.service().map(|s| s.key().to_string()),
            middlewares: router.middlewares().iter().map(|m| m.name.clone()).collect(),
            online,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub accepted_methods: Vec<String>,
    pub endpoints: Vec<String>,
    pub online_endpoints: usize,
}

impl From<&Service> for ServiceView {
    fn from(service: &Service) -> Self {
        Self {
            name: service.key().to_string(),
            accepted_methods: service
                .accepted_methods()
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
            endpoints: service.endpoint_names(),
            online_endpoints: service.online_endpoints().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: Status,
    pub health_check_id: Option<String>,
    pub health_check: Option<HealthCheck>,
    pub rate_limit: Option<RateLimit>,
}

impl From<&Endpoint> for EndpointView {
    fn from(ep: &Endpoint) -> Self {
        Self {
            name: ep.key().to_string(),
            host: ep.host().to_string(),
            port: ep.port(),
            status: ep.status(),
            health_check_id: ep.health_check_id(),
            health_check: ep.health_check().map(|hc| (*hc).clone()),
            rate_limit: ep.rate_limit(),
        }
    }
}

/// Whole-table view, sorted by key for stable output.
#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub version: String,
    pub routes: Vec<RouterView>,
    pub online: Vec<String>,
    pub services: Vec<ServiceView>,
    pub endpoints: Vec<EndpointView>,
}
