//! Request-dispatch lookup.
//!
//! The HTTP server and middleware pipeline live outside the routing core.
//! This is the boundary they call: an exact match of the request path
//! against the online subset, followed by the service's method allow-list.

use axum::http::{Method, StatusCode};
use std::sync::Arc;
use thiserror::Error;

use crate::routing::entity::{BackendApi, Middleware};
use crate::routing::router::Router;
use crate::routing::service::Service;
use crate::routing::table::RoutingTable;

/// Everything the dispatch pipeline needs for one request.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub router: Arc<Router>,
    pub service: Arc<Service>,
    pub backend: Arc<BackendApi>,
    pub middlewares: Vec<Arc<Middleware>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no route for {0}")]
    NoRoute(String),

    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed { path: String, method: Method },

    /// The router is online but its service has been removed.
    #[error("route {0} has no service bound")]
    ServiceDetached(String),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::NoRoute(_) => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::ServiceDetached(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl RoutingTable {
    /// Resolve a request against the online routers.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Dispatch, DispatchError> {
        let router = self.lookup_online(path).ok_or_else(|| {
            tracing::debug!(path = %path, "No route matched");
            DispatchError::NoRoute(path.to_string())
        })?;

        let service = router
            .service()
            .ok_or_else(|| DispatchError::ServiceDetached(path.to_string()))?;

        if !service.allows(method) {
            return Err(DispatchError::MethodNotAllowed {
                path: path.to_string(),
                method: method.clone(),
            });
        }

        Ok(Dispatch {
            backend: router.backend(),
            middlewares: router.middlewares().to_vec(),
            router,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::entity::Status;

    fn online_table(methods: Vec<Method>) -> RoutingTable {
        let table = RoutingTable::default();
        let svc = table.create_service("svc", methods);
        let ep = table.create_endpoint("ep", "127.0.0.1", 80, None, None);
        ep.set_status(Status::Online);
        svc.add_endpoint(ep);
        let (front, _) = table.create_frontend_api("/api/users");
        table
            .create_router("users", front, table.create_backend_api("/users"), svc, vec![Middleware::new("auth")])
            .unwrap();
        table
    }

    #[test]
    fn test_offline_router_is_not_routable() {
        let table = online_table(vec![]);
        let err = table.resolve(&Method::GET, "/api/users").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_resolve_online_router() {
        let table = online_table(vec![]);
        table.set_router_online("/api/users").unwrap();
        let dispatch = table.resolve(&Method::GET, "/api/users").unwrap();
        assert_eq!(dispatch.backend.key(), "/users");
        assert_eq!(dispatch.service.key(), "svc");
        assert_eq!(dispatch.middlewares.len(), 1);

        // Exact match only.
        assert!(table.resolve(&Method::GET, "/api/users/1").is_err());
    }

    #[test]
    fn test_method_allow_list() {
        let table = online_table(vec![Method::POST]);
        table.set_router_online("/api/users").unwrap();
        let err = table.resolve(&Method::GET, "/api/users").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(table.resolve(&Method::POST, "/api/users").is_ok());
    }
}
