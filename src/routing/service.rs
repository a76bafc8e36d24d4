//! Backend service: a named group of endpoints.
//!
//! The service's endpoint map is a view. Endpoint lifetime belongs to the
//! routing table's global endpoint registry.

use arc_swap::ArcSwap;
use axum::http::Method;
use std::sync::Arc;

use crate::routing::endpoint::Endpoint;
use crate::routing::entity::Status;
use crate::routing::registry::Registry;

#[derive(Debug)]
pub struct Service {
    name: Vec<u8>,
    key: String,
    endpoints: Registry<String, Arc<Endpoint>>,
    /// Empty list means every method is accepted.
    accepted_methods: ArcSwap<Vec<Method>>,
}

impl Service {
    pub fn new(name: impl Into<Vec<u8>>, accepted_methods: Vec<Method>) -> Self {
        let name = name.into();
        let key = String::from_utf8_lossy(&name).into_owned();
        Self {
            name,
            key,
            endpoints: Registry::new(),
            accepted_methods: ArcSwap::from_pointee(accepted_methods),
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn accepted_methods(&self) -> Arc<Vec<Method>> {
        self.accepted_methods.load_full()
    }

    pub fn set_accepted_methods(&self, methods: Vec<Method>) {
        self.accepted_methods.store(Arc::new(methods));
    }

    /// Whether a request with `method` may be dispatched to this service.
    pub fn allows(&self, method: &Method) -> bool {
        let methods = self.accepted_methods.load();
        methods.is_empty() || methods.contains(method)
    }

    /// Add or replace an endpoint in the view.
    pub fn add_endpoint(&self, endpoint: Arc<Endpoint>) {
        self.endpoints.store(endpoint.key().to_string(), endpoint);
    }

    pub fn remove_endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.delete(name)
    }

    pub fn has_endpoint(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.load(name)
    }

    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.values()
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names = self.endpoints.keys();
        names.sort();
        names
    }

    /// Replace the whole view atomically.
    pub fn replace_endpoints(&self, endpoints: Vec<Arc<Endpoint>>) {
        self.endpoints.with_exclusive(|map| {
            map.clear();
            for ep in endpoints {
                map.insert(ep.key().to_string(), ep);
            }
        });
    }

    /// Split the view into endpoints whose status equals `must` and the rest.
    pub fn check_endpoint_status(&self, must: Status) -> (Vec<Arc<Endpoint>>, Vec<Arc<Endpoint>>) {
        self.endpoints
            .values()
            .into_iter()
            .partition(|ep| ep.status() == must)
    }

    pub fn online_endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.check_endpoint_status(Status::Online).0
    }

    pub fn is_consistent(&self) -> bool {
        self.key.as_bytes() == self.name.as_slice()
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name || self.key != other.key {
            return false;
        }
        let ours = self.endpoints.entries();
        if ours.len() != other.endpoints.len() {
            return false;
        }
        ours.iter().all(|(name, ep)| {
            other
                .endpoints
                .load(name.as_str())
                .is_some_and(|theirs| **ep == *theirs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, status: Status) -> Arc<Endpoint> {
        let ep = Arc::new(Endpoint::new(name, "127.0.0.1", 8000, None, None));
        ep.set_status(status);
        ep
    }

    #[test]
    fn test_empty_method_list_allows_all() {
        let svc = Service::new("users", vec![]);
        assert!(svc.allows(&Method::DELETE));
        svc.set_accepted_methods(vec![Method::GET]);
        assert!(svc.allows(&Method::GET));
        assert!(!svc.allows(&Method::POST));
    }

    #[test]
    fn test_check_endpoint_status_partitions() {
        let svc = Service::new("users", vec![]);
        svc.add_endpoint(endpoint("a", Status::Online));
        svc.add_endpoint(endpoint("b", Status::Offline));
        svc.add_endpoint(endpoint("c", Status::BreakDown));

        let (online, rest) = svc.check_endpoint_status(Status::Online);
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].key(), "a");
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_equality_compares_endpoint_view() {
        let a = Service::new("users", vec![]);
        let b = Service::new("users", vec![Method::GET]);
        assert_eq!(a, b);

        a.add_endpoint(endpoint("x", Status::Online));
        assert_ne!(a, b);
        b.add_endpoint(endpoint("x", Status::Online));
        assert_eq!(a, b);
    }

    #[test]
    fn test_replace_endpoints() {
        let svc = Service::new("users", vec![]);
        svc.add_endpoint(endpoint("old", Status::Online));
        svc.replace_endpoints(vec![endpoint("n1", Status::Offline), endpoint("n2", Status::Offline)]);
        assert_eq!(svc.endpoint_names(), vec!["n1".to_string(), "n2".to_string()]);
    }
}
