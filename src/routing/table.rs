//! The authoritative routing table.
//!
//! # Responsibilities
//! - Own the five registries: frontend path → router, the online subset,
//!   services, endpoints and router name → router
//! - Enforce cross-entity invariants on every mutation
//! - Apply refreshed store records produced by the watchers
//!
//! # Invariants
//! - Each frontend path maps to at most one router
//! - `online` ⊆ `table`, and membership in `online` ⇔ router status is `Online`
//! - A router goes `Online` only if its service has an online endpoint, and
//!   every online endpoint is present in the endpoint registry
//! - Creation is idempotent by name/path
//!
//! # Design Decisions
//! - All operations are in-memory and safe to call from any task
//! - Transitions of one router are serialized by its transition lock
//! - Service removal is the only multi-key check under an exclusive section

use axum::http::Method;
use std::sync::Arc;

use crate::error::RoutingError;
use crate::routing::descriptor::{EndpointDescriptor, RouterDescriptor, ServiceDescriptor};
use crate::routing::endpoint::Endpoint;
use crate::routing::entity::{
    same_middleware_set, BackendApi, FrontendApi, HealthCheck, Middleware, RateLimit, Status,
};
use crate::routing::registry::Registry;
use crate::routing::router::Router;
use crate::routing::service::Service;
use crate::routing::snapshot::{EndpointView, RouterView, ServiceView, TableSnapshot};

#[derive(Debug)]
pub struct RoutingTable {
    version: String,
    /// frontend path → router
    table: Registry<String, Arc<Router>>,
    /// frontend path → router, online routers only
    online: Registry<String, Arc<Router>>,
    services: Registry<String, Arc<Service>>,
    endpoints: Registry<String, Arc<Endpoint>>,
    /// router name → router
    routers: Registry<String, Arc<Router>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl RoutingTable {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            table: Registry::new(),
            online: Registry::new(),
            services: Registry::new(),
            endpoints: Registry::new(),
            routers: Registry::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    // --- Entity constructors ---

    pub fn create_backend_api(&self, path: impl Into<Vec<u8>>) -> Arc<BackendApi> {
        Arc::new(BackendApi::new(path))
    }

    /// Create a frontend api. When a router is already registered at `path`,
    /// its bound api is returned and the flag is `true`.
    pub fn create_frontend_api(&self, path: impl Into<Vec<u8>>) -> (Arc<FrontendApi>, bool) {
        let api = FrontendApi::new(path);
        if let Some(existing) = self.table.load(api.key()).and_then(|r| r.frontend()) {
            return (existing, true);
        }
        (Arc::new(api), false)
    }

    /// Create a service, or return the registered one unchanged.
    pub fn create_service(&self, name: impl Into<Vec<u8>>, accepted_methods: Vec<Method>) -> Arc<Service> {
        let service = Service::new(name, accepted_methods);
        let key = service.key().to_string();
        let (service, existed) = self.services.get_or_insert_with(key, || Arc::new(service));
        if !existed {
            tracing::debug!(service = %service.key(), "Service registered");
        }
        service
    }

    /// Create an endpoint, or return the registered one unchanged.
    pub fn create_endpoint(
        &self,
        name: impl Into<Vec<u8>>,
        host: impl Into<String>,
        port: u16,
        health_check: Option<HealthCheck>,
        rate_limit: Option<RateLimit>,
    ) -> Arc<Endpoint> {
        let endpoint = Endpoint::new(name, host, port, health_check, rate_limit);
        let key = endpoint.key().to_string();
        let (endpoint, existed) = self.endpoints.get_or_insert_with(key, || Arc::new(endpoint));
        if !existed {
            tracing::debug!(endpoint = %endpoint.key(), address = %endpoint.address(), "Endpoint registered");
        }
        endpoint
    }

    // --- Routers ---

    /// Register a router at the frontend path.
    ///
    /// The service must currently have at least one online endpoint; those
    /// endpoints are reconciled into the endpoint registry.
    pub fn create_router(
        &self,
        name: impl Into<Vec<u8>>,
        frontend: Arc<FrontendApi>,
        backend: Arc<BackendApi>,
        service: Arc<Service>,
        middlewares: Vec<Arc<Middleware>>,
    ) -> Result<Arc<Router>, RoutingError> {
        if frontend.key().is_empty() {
            tracing::error!("Frontend api not completed");
            return Err(RoutingError::IncompleteObject { kind: "router", field: "frontend_api" });
        }
        if backend.key().is_empty() {
            tracing::error!("Backend api not completed");
            return Err(RoutingError::IncompleteObject { kind: "router", field: "backend_api" });
        }
        if service.key().is_empty() {
            tracing::error!("Service not completed");
            return Err(RoutingError::IncompleteObject { kind: "router", field: "service" });
        }

        let path = frontend.key().to_string();
        if self.table.contains_key(path.as_str()) {
            return Err(RoutingError::already_exists("router", path));
        }

        let online = service.online_endpoints();
        if online.is_empty() {
            return Err(RoutingError::NoOnlineEndpoint(service.key().to_string()));
        }
        self.reconcile_endpoints(&online)?;

        let router = Arc::new(Router::new(name, frontend, backend, Arc::clone(&service), middlewares));

        self.services
            .get_or_insert_with(service.key().to_string(), || Arc::clone(&service));
        if !self.table.insert_if_absent(path.clone(), Arc::clone(&router)) {
            return Err(RoutingError::already_exists("router", path));
        }
        self.routers.store(router.key().to_string(), Arc::clone(&router));

        tracing::info!(router = %router.key(), path = %path, service = %service.key(), "Router created");
        Ok(router)
    }

    pub fn get_router_by_name(&self, name: &str) -> Result<Arc<Router>, RoutingError> {
        self.routers.load(name).ok_or_else(|| {
            tracing::warn!(router = %name, "Can not find router by name");
            RoutingError::not_found("router", name)
        })
    }

    pub fn get_router_by_path(&self, path: &str) -> Option<Arc<Router>> {
        self.table.load(path)
    }

    /// Detach the frontend api from the router registered at `path`.
    ///
    /// The router itself stays registered.
    pub fn remove_frontend_api(&self, path: &str) -> Result<(), RoutingError> {
        let router = self
            .table
            .load(path)
            .ok_or_else(|| RoutingError::not_found("router", path))?;
        let _guard = router.lock_transition();
        if router.is_online() {
            return Err(RoutingError::RouterOnline(path.to_string()));
        }
        router.detach_frontend();
        Ok(())
    }

    /// Remove the router's routing-table entry.
    ///
    /// The router-by-name entry and service references are left in place;
    /// see [`RoutingTable::delete_router`] for full cleanup.
    pub fn remove_router(&self, router: &Arc<Router>) -> Result<(), RoutingError> {
        let path = self
            .path_of(router)
            .ok_or_else(|| {
                tracing::warn!(router = %router.key(), "Router not exists");
                RoutingError::not_found("router", router.key())
            })?;

        let _guard = router.lock_transition();
        if router.is_online() {
            return Err(RoutingError::RouterOnline(path));
        }
        self.table.delete_if(path.as_str(), |r| Arc::ptr_eq(r, router));
        tracing::info!(router = %router.key(), path = %path, "Router removed");
        Ok(())
    }

    /// Set the router status. `Online` goes through the guarded transition;
    /// any other status evicts the router from the online subset.
    pub fn set_router_status(&self, path: &str, status: Status) -> Result<(), RoutingError> {
        if status == Status::Online {
            return self.set_router_online(path);
        }

        let router = self.table.load(path).ok_or_else(|| {
            tracing::warn!(path = %path, "Router not exists");
            RoutingError::not_found("router", path)
        })?;

        let _guard = router.lock_transition();
        if self.online.delete(path).is_some() {
            tracing::info!(router = %router.key(), path = %path, "Router taken offline");
        }
        router.set_status(status);
        Ok(())
    }

    /// Guarded transition to `Online`.
    pub fn set_router_online(&self, path: &str) -> Result<(), RoutingError> {
        let router = self.table.load(path).ok_or_else(|| {
            tracing::warn!(path = %path, "Router not exists");
            RoutingError::not_found("router", path)
        })?;

        let _guard = router.lock_transition();

        if let Some(online_router) = self.online.load(path) {
            if !Arc::ptr_eq(&online_router, &router) {
                tracing::error!(path = %path, "Online table disagrees with routing table");
                return Err(RoutingError::DataMappingError(path.to_string()));
            }
            return Err(RoutingError::AlreadyOnline(path.to_string()));
        }

        let Some(service) = router.service() else {
            tracing::warn!(router = %router.key(), path = %path, "Router has no service bound");
            return Err(RoutingError::NoOnlineEndpoint(format!("{} (no service bound)", path)));
        };
        let online = service.online_endpoints();
        if online.is_empty() {
            return Err(RoutingError::NoOnlineEndpoint(service.key().to_string()));
        }
        self.reconcile_endpoints(&online)?;

        router.set_status(Status::Online);
        self.online.store(path.to_string(), Arc::clone(&router));
        tracing::info!(router = %router.key(), path = %path, "Router online");
        Ok(())
    }

    /// Lookup used by the dispatch path: online routers only, exact match.
    pub fn lookup_online(&self, path: &str) -> Option<Arc<Router>> {
        self.online.load(path)
    }

    pub fn is_online(&self, path: &str) -> bool {
        self.online.contains_key(path)
    }

    pub fn route_count(&self) -> usize {
        self.table.len()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths = self.table.keys();
        paths.sort();
        paths
    }

    pub fn online_paths(&self) -> Vec<String> {
        let mut paths = self.online.keys();
        paths.sort();
        paths
    }

    // --- Services ---

    pub fn get_service_by_name(&self, name: &str) -> Result<Arc<Service>, RoutingError> {
        self.services.load(name).ok_or_else(|| {
            tracing::warn!(service = %name, "Can not find service by name");
            RoutingError::not_found("service", name)
        })
    }

    /// Remove a service and detach it from every router that references it.
    ///
    /// If an online router references the service, `ServiceInUse` is
    /// returned, but the detachment and removal still take place.
    pub fn remove_service(&self, service: &Arc<Service>) -> Result<(), RoutingError> {
        if !self.services.contains_key(service.key()) {
            tracing::warn!(service = %service.key(), "Can not find service by name");
            return Err(RoutingError::not_found("service", service.key()));
        }

        // Referencing routers stay locked across both passes.
        // Lock order is router, then table, as in `remove_router`.
        let result = loop {
            let mut holders: Vec<Arc<Router>> = self
                .table
                .values()
                .into_iter()
                .filter(|r| r.references_service(service))
                .collect();
            holders.sort_by_key(|r| Arc::as_ptr(r) as usize);
            let guards: Vec<_> = holders.iter().map(|r| r.lock_transition()).collect();

            let outcome = self.table.with_exclusive(|routes| {
                let current: Vec<&Arc<Router>> = routes
                    .values()
                    .filter(|r| r.references_service(service))
                    .collect();
                let unchanged = current.len() == holders.len()
                    && current.iter().all(|r| holders.iter().any(|h| Arc::ptr_eq(h, r)));
                if !unchanged {
                    return None;
                }

                let in_use = current.iter().any(|r| r.is_online());
                for router in &current {
                    router.detach_service();
                }

                Some(if in_use {
                    Err(RoutingError::ServiceInUse(service.key().to_string()))
                } else {
                    Ok(())
                })
            });

            drop(guards);
            if let Some(result) = outcome {
                break result;
            }
        };

        self.services
            .delete_if(service.key(), |s| Arc::ptr_eq(s, service));
        match &result {
            Ok(()) => tracing::info!(service = %service.key(), "Service removed"),
            Err(e) => tracing::warn!(service = %service.key(), error = %e, "Service removed while in use"),
        }
        result
    }

    // --- Endpoints ---

    pub fn get_endpoint_by_name(&self, name: &str) -> Result<Arc<Endpoint>, RoutingError> {
        self.endpoints
            .load(name)
            .ok_or_else(|| RoutingError::not_found("endpoint", name))
    }

    /// Remove the endpoint from the endpoint registry. Service views that
    /// still hold it are not touched.
    pub fn remove_endpoint(&self, endpoint: &Arc<Endpoint>) -> Result<(), RoutingError> {
        if self.endpoints.delete(endpoint.key()).is_none() {
            tracing::warn!(endpoint = %endpoint.key(), "Can not find endpoint by name");
            return Err(RoutingError::not_found("endpoint", endpoint.key()));
        }
        tracing::info!(endpoint = %endpoint.key(), "Endpoint removed");
        Ok(())
    }

    /// Insert any of `online` missing from the endpoint registry.
    fn reconcile_endpoints(&self, online: &[Arc<Endpoint>]) -> Result<(), RoutingError> {
        for ep in online {
            if self.endpoints.contains_key(ep.key()) {
                continue;
            }
            tracing::warn!(endpoint = %ep.key(), "Online endpoint missing from endpoint registry, repairing");
            if !self.endpoints.insert_if_absent(ep.key().to_string(), Arc::clone(ep)) {
                tracing::error!(endpoint = %ep.key(), "Error raised when adding endpoint to endpoint registry");
                return Err(RoutingError::ReconciliationFailed {
                    endpoint: ep.key().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Table key of `router`, falling back to an identity scan when the
    /// frontend api has been detached.
    fn path_of(&self, router: &Arc<Router>) -> Option<String> {
        if let Some(frontend) = router.frontend() {
            return self
                .table
                .load(frontend.key())
                .filter(|r| Arc::ptr_eq(r, router))
                .map(|_| frontend.key().to_string());
        }
        self.table
            .entries()
            .into_iter()
            .find(|(_, r)| Arc::ptr_eq(r, router))
            .map(|(path, _)| path)
    }

    // --- Refresh operations driven by the watchers ---

    /// Apply a service record. Returns how many listed endpoints are not
    /// registered yet and were left out of the view.
    pub fn refresh_service(&self, desc: &ServiceDescriptor) -> usize {
        let service = self.create_service(desc.name.as_bytes(), desc.accepted_methods.clone());
        service.set_accepted_methods(desc.accepted_methods.clone());

        let mut view = Vec::with_capacity(desc.endpoints.len());
        let mut missing = 0;
        for name in &desc.endpoints {
            match self.endpoints.load(name.as_str()) {
                Some(ep) => view.push(ep),
                None => {
                    tracing::debug!(service = %desc.name, endpoint = %name, "Endpoint not registered yet");
                    missing += 1;
                }
            }
        }
        service.replace_endpoints(view);
        tracing::info!(service = %desc.name, endpoints = desc.endpoints.len() - missing, missing, "Service refreshed");
        missing
    }

    /// Apply an endpoint record. An address change replaces the instance in
    /// the registry and in every service view holding it.
    pub fn refresh_endpoint(&self, desc: &EndpointDescriptor) -> Arc<Endpoint> {
        let endpoint = match self.endpoints.load(desc.name.as_str()) {
            Some(ep) if ep.host() == desc.host && ep.port() == desc.port => ep,
            Some(old) => {
                let fresh = Arc::new(Endpoint::new(
                    desc.name.as_bytes(),
                    desc.host.clone(),
                    desc.port,
                    None,
                    None,
                ));
                self.endpoints.store(desc.name.clone(), Arc::clone(&fresh));
                for service in self.services.values() {
                    if service.has_endpoint(&desc.name) {
                        service.add_endpoint(Arc::clone(&fresh));
                    }
                }
                tracing::info!(
                    endpoint = %desc.name,
                    old = %old.address(),
                    new = %fresh.address(),
                    "Endpoint address changed"
                );
                fresh
            }
            None => self.create_endpoint(desc.name.as_bytes(), desc.host.clone(), desc.port, None, None),
        };

        endpoint.set_health_check_id(desc.health_check_id.clone());
        if desc.health_check.is_some() {
            endpoint.set_health_check(desc.health_check.clone());
        }
        endpoint.set_rate_limit(desc.rate_limit);
        if endpoint.status() != desc.status {
            tracing::info!(endpoint = %desc.name, from = ?endpoint.status(), to = ?desc.status, "Endpoint status changed");
            endpoint.set_status(desc.status);
        }
        endpoint
    }

    /// Attach a registered endpoint to a registered service's view.
    pub fn bind_endpoint(&self, service: &str, endpoint: &str) -> Result<(), RoutingError> {
        let service = self.get_service_by_name(service)?;
        let endpoint = self.get_endpoint_by_name(endpoint)?;
        service.add_endpoint(endpoint);
        Ok(())
    }

    /// Apply a router record: create it if absent, replace it if its
    /// structure changed, then converge its status.
    pub fn refresh_router(&self, desc: &RouterDescriptor) -> Result<Arc<Router>, RoutingError> {
        let service = self.get_service_by_name(&desc.service)?;

        let existing = self.routers.load(desc.name.as_str());
        if let Some(router) = &existing {
            self.reattach_service(router, &service);
        }

        let router = match existing {
            Some(existing) if self.matches_descriptor(&existing, desc, &service) => existing,
            Some(existing) => self.replace_router(existing, desc, service)?,
            None => self.create_router_from(desc, service)?,
        };

        if router.status() != desc.status {
            self.set_router_status(&desc.frontend, desc.status)?;
        }
        Ok(router)
    }

    /// Rebind a service that was detached by `remove_service` and has since
    /// been registered again under the same name.
    fn reattach_service(&self, router: &Router, service: &Arc<Service>) {
        let _guard = router.lock_transition();
        if router.service().is_none() {
            router.attach_service(Arc::clone(service));
            tracing::info!(router = %router.key(), service = %service.key(), "Service reattached to router");
        }
    }

    /// Swap `existing` for a router built from `desc`. Nothing is removed
    /// unless the replacement can be registered; a failed registration puts
    /// the old router back.
    fn replace_router(
        &self,
        existing: Arc<Router>,
        desc: &RouterDescriptor,
        service: Arc<Service>,
    ) -> Result<Arc<Router>, RoutingError> {
        if existing.is_online() {
            return Err(RoutingError::RouterOnline(desc.name.clone()));
        }
        if let Some(occupant) = self.table.load(desc.frontend.as_str()) {
            if !Arc::ptr_eq(&occupant, &existing) {
                return Err(RoutingError::already_exists("router", desc.frontend.as_str()));
            }
        }
        if service.online_endpoints().is_empty() {
            return Err(RoutingError::NoOnlineEndpoint(service.key().to_string()));
        }

        let old_path = self.path_of(&existing);
        if let Some(path) = &old_path {
            self.table.delete_if(path.as_str(), |r| Arc::ptr_eq(r, &existing));
        }
        self.routers
            .delete_if(desc.name.as_str(), |r| Arc::ptr_eq(r, &existing));
        tracing::info!(router = %desc.name, "Router definition changed, replacing");

        match self.create_router_from(desc, service) {
            Ok(router) => Ok(router),
            Err(e) => {
                if let Some(path) = old_path {
                    self.table.insert_if_absent(path, Arc::clone(&existing));
                }
                self.routers.insert_if_absent(desc.name.clone(), existing);
                tracing::warn!(router = %desc.name, error = %e, "Router replacement failed, previous definition kept");
                Err(e)
            }
        }
    }

    fn matches_descriptor(&self, router: &Router, desc: &RouterDescriptor, service: &Arc<Service>) -> bool {
        let middlewares: Vec<Arc<Middleware>> = desc.middlewares.iter().map(Middleware::new).collect();
        router.frontend().is_some_and(|f| f.key() == desc.frontend)
            && router.backend().key() == desc.backend
            && router.references_service(service)
            && same_middleware_set(router.middlewares(), &middlewares)
    }

    fn create_router_from(&self, desc: &RouterDescriptor, service: Arc<Service>) -> Result<Arc<Router>, RoutingError> {
        let (frontend, _) = self.create_frontend_api(desc.frontend.as_bytes());
        let backend = self.create_backend_api(desc.backend.as_bytes());
        let middlewares = desc.middlewares.iter().map(Middleware::new).collect();
        self.create_router(desc.name.as_bytes(), frontend, backend, service, middlewares)
    }

    /// Swap `health_check` into every endpoint that references its id.
    pub fn refresh_health_check(&self, health_check: &HealthCheck) -> usize {
        let mut updated = 0;
        for ep in self.endpoints.values() {
            if ep.health_check_id().as_deref() == Some(health_check.id.as_str()) {
                ep.set_health_check(Some(health_check.clone()));
                updated += 1;
            }
        }
        tracing::info!(health_check = %health_check.id, endpoints = updated, "Health check refreshed");
        updated
    }

    /// Drop the resolved descriptor from endpoints referencing `id`.
    pub fn delete_health_check(&self, id: &str) -> usize {
        let mut updated = 0;
        for ep in self.endpoints.values() {
            if ep.health_check_id().as_deref() == Some(id) && ep.health_check().is_some() {
                ep.set_health_check(None);
                updated += 1;
            }
        }
        updated
    }

    /// Unregister a router completely: table entry and router-by-name entry.
    pub fn delete_router(&self, name: &str) -> Result<(), RoutingError> {
        let router = self.get_router_by_name(name)?;
        self.remove_router(&router)?;
        self.routers.delete_if(name, |r| Arc::ptr_eq(r, &router));
        Ok(())
    }

    pub fn delete_service(&self, name: &str) -> Result<(), RoutingError> {
        let service = self.get_service_by_name(name)?;
        self.remove_service(&service)
    }

    /// Remove an endpoint from the registry and from every service view.
    pub fn delete_endpoint(&self, name: &str) -> Result<(), RoutingError> {
        let endpoint = self.get_endpoint_by_name(name)?;
        self.remove_endpoint(&endpoint)?;
        for service in self.services.values() {
            service.remove_endpoint(name);
        }
        Ok(())
    }

    // --- Views ---

    pub fn snapshot(&self) -> TableSnapshot {
        let mut routes: Vec<RouterView> = self
            .table
            .entries()
            .iter()
            .map(|(path, r)| RouterView::new(path, r, self.online.contains_key(path.as_str())))
            .collect();
        routes.sort_by(|a, b| a.path.cmp(&b.path));

        let mut services: Vec<ServiceView> = self.services.values().iter().map(|s| ServiceView::from(&**s)).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));

        let mut endpoints: Vec<EndpointView> = self.endpoints.values().iter().map(|e| EndpointView::from(&**e)).collect();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));

        TableSnapshot {
            version: self.version.clone(),
            routes,
            online: self.online_paths(),
            services,
            endpoints,
        }
    }

    /// Check the online-subset invariant. Used by tests and the admin status route.
    pub fn online_subset_consistent(&self) -> bool {
        let online_ok = self.online.entries().iter().all(|(path, router)| {
            router.is_online()
                && self
                    .table
                    .load(path.as_str())
                    .is_some_and(|r| Arc::ptr_eq(&r, router))
        });
        let table_ok = self
            .table
            .entries()
            .iter()
            .all(|(path, router)| router.is_online() == self.online.contains_key(path.as_str()));
        online_ok && table_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with_endpoint(table: &RoutingTable, svc: &str, ep: &str, status: Status) -> Arc<Service> {
        let service = table.create_service(svc, vec![]);
        let endpoint = table.create_endpoint(ep, "127.0.0.1", 8080, None, None);
        endpoint.set_status(status);
        service.add_endpoint(endpoint);
        service
    }

    fn add_router(table: &RoutingTable, name: &str, path: &str, service: &Arc<Service>) -> Result<Arc<Router>, RoutingError> {
        let (front, _) = table.create_frontend_api(path);
        let back = table.create_backend_api("/back");
        table.create_router(name, front, back, Arc::clone(service), vec![])
    }

    #[test]
    fn test_create_router_requires_complete_objects() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let err = table
            .create_router("r", Arc::new(FrontendApi::new("")), table.create_backend_api("/b"), svc, vec![])
            .unwrap_err();
        assert!(matches!(err, RoutingError::IncompleteObject { field: "frontend_api", .. }));

        let empty = Arc::new(Service::new("", vec![]));
        let (front, _) = table.create_frontend_api("/f");
        let err = table
            .create_router("r", front, table.create_backend_api("/b"), empty, vec![])
            .unwrap_err();
        assert!(matches!(err, RoutingError::IncompleteObject { field: "service", .. }));
    }

    #[test]
    fn test_create_router_rejects_duplicate_path() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        add_router(&table, "r1", "/front", &svc).unwrap();
        let err = add_router(&table, "r2", "/front", &svc).unwrap_err();
        assert!(matches!(err, RoutingError::AlreadyExists { .. }));
        assert_eq!(table.route_count(), 1);
    }

    #[test]
    fn test_create_router_repairs_missing_endpoint() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let ep = table.get_endpoint_by_name("ep").unwrap();
        table.remove_endpoint(&ep).unwrap();
        assert!(table.get_endpoint_by_name("ep").is_err());

        add_router(&table, "r", "/front", &svc).unwrap();
        assert!(table.get_endpoint_by_name("ep").is_ok());
    }

    #[test]
    fn test_set_router_online_detects_mapping_error() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        add_router(&table, "r", "/front", &svc).unwrap();

        // Simulate a prior consistency violation.
        let stray = Arc::new(Router::new(
            "stray",
            Arc::new(FrontendApi::new("/front")),
            table.create_backend_api("/x"),
            Arc::clone(&svc),
            vec![],
        ));
        table.online.store("/front".into(), stray);

        let err = table.set_router_online("/front").unwrap_err();
        assert!(matches!(err, RoutingError::DataMappingError(_)));
    }

    #[test]
    fn test_remove_frontend_api_keeps_router() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let router = add_router(&table, "r", "/front", &svc).unwrap();

        table.set_router_online("/front").unwrap();
        assert!(matches!(table.remove_frontend_api("/front"), Err(RoutingError::RouterOnline(_))));

        table.set_router_status("/front", Status::Offline).unwrap();
        table.remove_frontend_api("/front").unwrap();
        assert!(router.frontend().is_none());
        assert!(table.get_router_by_path("/front").is_some());

        // The detached router can still be located and removed by identity.
        table.remove_router(&router).unwrap();
        assert_eq!(table.route_count(), 0);
    }

    #[test]
    fn test_remove_router_leaves_name_entry() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let router = add_router(&table, "r", "/front", &svc).unwrap();
        table.remove_router(&router).unwrap();
        assert!(table.get_router_by_name("r").is_ok());
        assert!(matches!(table.remove_router(&router), Err(RoutingError::NotFound { .. })));
    }

    #[test]
    fn test_remove_endpoint_is_unconditional() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        add_router(&table, "r", "/front", &svc).unwrap();
        table.set_router_online("/front").unwrap();

        let ep = table.get_endpoint_by_name("ep").unwrap();
        table.remove_endpoint(&ep).unwrap();
        assert!(matches!(table.remove_endpoint(&ep), Err(RoutingError::NotFound { .. })));
        // The service view is untouched.
        assert!(svc.has_endpoint("ep"));
    }

    #[test]
    fn test_refresh_endpoint_address_change_replaces_view_entry() {
        let table = RoutingTable::default();
        let svc = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let desc = EndpointDescriptor {
            name: "ep".into(),
            host: "10.0.0.2".into(),
            port: 9000,
            status: Status::Online,
            health_check_id: None,
            health_check: None,
            rate_limit: None,
        };
        let fresh = table.refresh_endpoint(&desc);
        assert_eq!(fresh.address(), "10.0.0.2:9000");
        let in_view = svc.endpoint("ep").unwrap();
        assert!(Arc::ptr_eq(&in_view, &fresh));
    }

    #[test]
    fn test_refresh_router_converges_status_and_structure() {
        let table = RoutingTable::default();
        service_with_endpoint(&table, "svc", "ep", Status::Online);
        let mut desc = RouterDescriptor {
            name: "r".into(),
            frontend: "/front".into(),
            backend: "/back".into(),
            service: "svc".into(),
            status: Status::Online,
            middlewares: vec!["auth".into()],
        };
        let first = table.refresh_router(&desc).unwrap();
        assert!(table.is_online("/front"));

        // Same definition: no-op.
        let again = table.refresh_router(&desc).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Structural change while online is refused.
        desc.backend = "/back/v2".into();
        assert!(matches!(table.refresh_router(&desc), Err(RoutingError::RouterOnline(_))));

        desc.backend = "/back".into();
        desc.status = Status::Offline;
        table.refresh_router(&desc).unwrap();
        assert!(!table.is_online("/front"));

        desc.backend = "/back/v2".into();
        let replaced = table.refresh_router(&desc).unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert_eq!(replaced.backend().key(), "/back/v2");
        assert_eq!(table.route_count(), 1);
    }

    #[test]
    fn test_failed_router_replacement_keeps_previous_definition() {
        let table = RoutingTable::default();
        let service = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let desc = |name: &str, frontend: &str| RouterDescriptor {
            name: name.into(),
            frontend: frontend.into(),
            backend: "/back".into(),
            service: "svc".into(),
            status: Status::Offline,
            middlewares: vec![],
        };
        let original = table.refresh_router(&desc("r", "/a")).unwrap();
        table.refresh_router(&desc("r2", "/b")).unwrap();

        // The new path belongs to another router.
        let err = table.refresh_router(&desc("r", "/b")).unwrap_err();
        assert!(matches!(err, RoutingError::AlreadyExists { .. }));
        assert!(Arc::ptr_eq(&table.get_router_by_name("r").unwrap(), &original));
        assert!(Arc::ptr_eq(&table.get_router_by_path("/a").unwrap(), &original));

        // The service has no online endpoint to admit the replacement.
        table.get_endpoint_by_name("ep").unwrap().set_status(Status::Offline);
        let err = table.refresh_router(&desc("r", "/c")).unwrap_err();
        assert!(matches!(err, RoutingError::NoOnlineEndpoint(_)));
        assert!(Arc::ptr_eq(&table.get_router_by_name("r").unwrap(), &original));
        assert!(table.get_router_by_path("/c").is_none());
        assert_eq!(table.route_count(), 2);
        assert!(original.references_service(&service));
    }

    #[test]
    fn test_refresh_router_reattaches_recreated_service() {
        let table = RoutingTable::default();
        let service = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let desc = RouterDescriptor {
            name: "r".into(),
            frontend: "/front".into(),
            backend: "/back".into(),
            service: "svc".into(),
            status: Status::Offline,
            middlewares: vec![],
        };
        let router = table.refresh_router(&desc).unwrap();

        table.remove_service(&service).unwrap();
        assert!(router.service().is_none());
        let err = table.set_router_online("/front").unwrap_err();
        assert_eq!(err, RoutingError::NoOnlineEndpoint("/front (no service bound)".to_string()));

        let recreated = service_with_endpoint(&table, "svc", "ep", Status::Online);
        let again = table.refresh_router(&desc).unwrap();
        assert!(Arc::ptr_eq(&router, &again));
        assert!(router.references_service(&recreated));
        table.set_router_online("/front").unwrap();
    }

    #[test]
    fn test_remove_service_races_with_promotion() {
        let table = Arc::new(RoutingTable::default());
        let endpoint = table.create_endpoint("ep", "127.0.0.1", 8080, None, None);
        endpoint.set_status(Status::Online);

        for round in 0..50 {
            let service = table.create_service("svc", vec![]);
            service.add_endpoint(Arc::clone(&endpoint));
            let path = format!("/r{round}");
            add_router(&table, &format!("r{round}"), &path, &service).unwrap();

            let promoter = {
                let table = Arc::clone(&table);
                let path = path.clone();
                std::thread::spawn(move || {
                    let _ = table.set_router_online(&path);
                })
            };
            let removed = table.remove_service(&service);
            promoter.join().unwrap();

            // Online after removal only when the removal saw it online.
            let router = table.get_router_by_path(&path).unwrap();
            assert!(router.service().is_none());
            assert_eq!(router.is_online(), matches!(removed, Err(RoutingError::ServiceInUse(_))));
            if table.is_online(&path) {
                table.set_router_status(&path, Status::Offline).unwrap();
            }
        }
        assert!(table.online_subset_consistent());
    }

    #[test]
    fn test_health_check_refresh_targets_matching_endpoints() {
        let table = RoutingTable::default();
        let a = table.create_endpoint("a", "h", 1, None, None);
        let b = table.create_endpoint("b", "h", 2, None, None);
        a.set_health_check_id(Some("hc-1".into()));
        b.set_health_check_id(Some("hc-2".into()));

        let hc = HealthCheck {
            id: "hc-1".into(),
            path: "/check".into(),
            timeout_secs: 5,
            interval_secs: 10,
            retry: false,
            retry_time: 0,
        };
        assert_eq!(table.refresh_health_check(&hc), 1);
        assert!(a.health_check().is_some());
        assert!(b.health_check().is_none());
        assert_eq!(table.delete_health_check("hc-1"), 1);
        assert!(a.health_check().is_none());
    }
}
