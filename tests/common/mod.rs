//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use api_gateway::routing::{RoutingTable, Service, Status};
use api_gateway::store::MemoryStore;

/// Write a complete service record as one transaction.
pub fn seed_service(store: &MemoryStore, name: &str, nodes: &[&str]) {
    let nodes = serde_json::to_string(nodes).unwrap();
    store.put_all([
        (format!("/Service/Service-{name}/Name"), name.to_string()),
        (format!("/Service/Service-{name}/Node"), nodes),
    ]);
}

/// Write a complete endpoint (`Node`) record as one transaction.
pub fn seed_endpoint(store: &MemoryStore, id: &str, port: u16, status: Status) {
    store.put_all([
        (format!("/Node/Node-{id}/ID"), id.to_string()),
        (format!("/Node/Node-{id}/Name"), id.to_string()),
        (format!("/Node/Node-{id}/Host"), "127.0.0.1".to_string()),
        (format!("/Node/Node-{id}/Port"), port.to_string()),
        (format!("/Node/Node-{id}/Status"), (status as u8).to_string()),
    ]);
}

/// Write a complete router record as one transaction.
pub fn seed_router(store: &MemoryStore, name: &str, frontend: &str, service: &str, status: Status) {
    store.put_all([
        (format!("/Router/Router-{name}/Name"), name.to_string()),
        (format!("/Router/Router-{name}/FrontendApi"), frontend.to_string()),
        (format!("/Router/Router-{name}/BackendApi"), format!("/backend{frontend}")),
        (format!("/Router/Router-{name}/Service"), service.to_string()),
        (format!("/Router/Router-{name}/Status"), (status as u8).to_string()),
    ]);
}

/// A table with service `svc` backed by one endpoint `ep` in `status`.
pub fn table_with_service(status: Status) -> (RoutingTable, Arc<Service>) {
    let table = RoutingTable::default();
    let service = table.create_service("svc", vec![]);
    let endpoint = table.create_endpoint("ep", "127.0.0.1", 8080, None, None);
    endpoint.set_status(status);
    service.add_endpoint(endpoint);
    (table, service)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
