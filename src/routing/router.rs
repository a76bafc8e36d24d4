//! Router: the unit of traffic admission.
//!
//! # Responsibilities
//! - Bind one frontend api, one backend api, one service and a middleware chain
//! - Carry the router status; only `Online` routers serve requests
//!
//! # Design Decisions
//! - Frontend and service are non-owning, detachable references
//! - Status transitions of one router are serialized by `transition`
//! - Status is only written through the routing table

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::routing::entity::{same_middleware_set, BackendApi, FrontendApi, Middleware, Status};
use crate::routing::service::Service;

#[derive(Debug)]
pub struct Router {
    name: Vec<u8>,
    key: String,
    status: AtomicU8,
    frontend: ArcSwapOption<FrontendApi>,
    backend: Arc<BackendApi>,
    service: ArcSwapOption<Service>,
    middlewares: Vec<Arc<Middleware>>,
    transition: Mutex<()>,
}

impl Router {
    pub(crate) fn new(
        name: impl Into<Vec<u8>>,
        frontend: Arc<FrontendApi>,
        backend: Arc<BackendApi>,
        service: Arc<Service>,
        middlewares: Vec<Arc<Middleware>>,
    ) -> Self {
        let name = name.into();
        let key = String::from_utf8_lossy(&name).into_owned();
        Self {
            name,
            key,
            status: AtomicU8::new(Status::Offline as u8),
            frontend: ArcSwapOption::new(Some(frontend)),
            backend,
            service: ArcSwapOption::new(Some(service)),
            middlewares,
            transition: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> Status {
        Status::from(self.status.load(Ordering::Acquire))
    }

    pub fn is_online(&self) -> bool {
        self.status() == Status::Online
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock()
    }

    pub fn frontend(&self) -> Option<Arc<FrontendApi>> {
        self.frontend.load_full()
    }

    pub(crate) fn detach_frontend(&self) -> Option<Arc<FrontendApi>> {
        self.frontend.swap(None)
    }

    pub fn backend(&self) -> Arc<BackendApi> {
        Arc::clone(&self.backend)
    }

    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.load_full()
    }

    /// Bind `service` again after it was detached by a service removal.
    pub(crate) fn attach_service(&self, service: Arc<Service>) {
        self.service.store(Some(service));
    }

    pub(crate) fn detach_service(&self) -> Option<Arc<Service>> {
        self.service.swap(None)
    }

    /// True when this router currently references `service` (identity, not name).
    pub fn references_service(&self, service: &Arc<Service>) -> bool {
        let current = self.service.load();
        matches!(&*current, Some(s) if Arc::ptr_eq(s, service))
    }

    pub fn middlewares(&self) -> &[Arc<Middleware>] {
        &self.middlewares
    }

    pub fn is_consistent(&self) -> bool {
        self.key.as_bytes() == self.name.as_slice()
    }
}

impl PartialEq for Router {
    fn eq(&self, other: &Self) -> bool {
        let frontend_eq = match (self.frontend(), other.frontend()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        };
        let service_eq = match (self.service(), other.service()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b) || a == b,
            (None, None) => true,
            _ => false,
        };
        self.name == other.name
            && frontend_eq
            && self.backend == other.backend
            && self.status() == other.status()
            && service_eq
            && same_middleware_set(&self.middlewares, &other.middlewares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(name: &str, middlewares: Vec<Arc<Middleware>>) -> Router {
        Router::new(
            name,
            Arc::new(FrontendApi::new("/front")),
            Arc::new(BackendApi::new("/back")),
            Arc::new(Service::new("svc", vec![])),
            middlewares,
        )
    }

    #[test]
    fn test_router_starts_offline() {
        let r = router("r", vec![]);
        assert_eq!(r.status(), Status::Offline);
        assert!(!r.is_online());
    }

    #[test]
    fn test_equality_ignores_middleware_order() {
        let a = router("r", vec![Middleware::new("auth"), Middleware::new("limit")]);
        let b = router("r", vec![Middleware::new("limit"), Middleware::new("auth")]);
        assert_eq!(a, b);

        b.set_status(Status::BreakDown);
        assert_ne!(a, b);
    }

    #[test]
    fn test_detach_references() {
        let r = router("r", vec![]);
        let svc = r.service().unwrap();
        assert!(r.references_service(&svc));
        assert!(r.detach_service().is_some());
        assert!(!r.references_service(&svc));
        assert!(r.detach_frontend().is_some());
        assert!(r.frontend().is_none());
    }
}
