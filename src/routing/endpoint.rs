//! Backend endpoint.
//!
//! # Responsibilities
//! - Represent a single physical backend target (name, host, port)
//! - Track admission status (Offline/Online/BreakDown) set by watch events
//! - Carry the health-check and rate-limit descriptors
//!
//! # Design Decisions
//! - Status lives in an atomic so the dispatch path reads it lock-free
//! - Descriptors are swapped whole via `arc-swap`, never mutated in place

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::routing::entity::{HealthCheck, RateLimit, Status};

#[derive(Debug)]
pub struct Endpoint {
    name: Vec<u8>,
    key: String,
    host: String,
    port: u16,
    status: AtomicU8,
    health_check_id: ArcSwapOption<String>,
    health_check: ArcSwapOption<HealthCheck>,
    rate_limit: ArcSwapOption<RateLimit>,
}

impl Endpoint {
    /// Create a new endpoint. Endpoints start `Offline`.
    pub fn new(
        name: impl Into<Vec<u8>>,
        host: impl Into<String>,
        port: u16,
        health_check: Option<HealthCheck>,
        rate_limit: Option<RateLimit>,
    ) -> Self {
        let name = name.into();
        let key = String::from_utf8_lossy(&name).into_owned();
        let health_check_id = health_check.as_ref().map(|hc| Arc::new(hc.id.clone()));
        Self {
            name,
            key,
            host: host.into(),
            port,
            status: AtomicU8::new(Status::Offline as u8),
            health_check_id: ArcSwapOption::new(health_check_id),
            health_check: ArcSwapOption::new(health_check.map(Arc::new)),
            rate_limit: ArcSwapOption::new(rate_limit.map(Arc::new)),
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form used by the dispatch path.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn status(&self) -> Status {
        Status::from(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.status() == Status::Online
    }

    pub fn health_check_id(&self) -> Option<String> {
        self.health_check_id.load_full().map(|id| (*id).clone())
    }

    /// Point the endpoint at a health-check id. A change of id clears the
    /// resolved descriptor until the matching one is refreshed in.
    pub fn set_health_check_id(&self, id: Option<String>) {
        if self.health_check_id() != id {
            self.health_check.store(None);
        }
        self.health_check_id.store(id.map(Arc::new));
    }

    pub fn health_check(&self) -> Option<Arc<HealthCheck>> {
        self.health_check.load_full()
    }

    pub fn set_health_check(&self, health_check: Option<HealthCheck>) {
        if let Some(hc) = &health_check {
            self.health_check_id.store(Some(Arc::new(hc.id.clone())));
        }
        self.health_check.store(health_check.map(Arc::new));
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit.load_full().map(|r| *r)
    }

    pub fn set_rate_limit(&self, rate_limit: Option<RateLimit>) {
        self.rate_limit.store(rate_limit.map(Arc::new));
    }

    pub fn is_consistent(&self) -> bool {
        self.key.as_bytes() == self.name.as_slice()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.key == other.key
            && self.status() == other.status()
            && self.host == other.host
            && self.port == other.port
    }
}
