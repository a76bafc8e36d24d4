//! Value objects shared by the routing entities.
//!
//! Every identity carries its raw bytes and the string key derived from them.
//! The two forms must stay identical; equality compares both.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Admission status of a router or endpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Offline = 0,
    Online = 1,
    BreakDown = 2,
}

impl From<u8> for Status {
    fn from(val: u8) -> Self {
        match val {
            1 => Status::Online,
            2 => Status::BreakDown,
            _ => Status::Offline,
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    /// Accepts the numeric store encoding (`0`, `1`, `2`) or the lowercase name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" | "offline" => Ok(Status::Offline),
            "1" | "online" => Ok(Status::Online),
            "2" | "breakdown" | "break_down" => Ok(Status::BreakDown),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

fn derive_key(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// External path pattern exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendApi {
    path: Vec<u8>,
    key: String,
}

impl FrontendApi {
    pub fn new(path: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let key = derive_key(&path);
        Self { path, key }
    }

    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// The string form used as the routing-table key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when the derived key still matches the raw path.
    pub fn is_consistent(&self) -> bool {
        self.key.as_bytes() == self.path.as_slice()
    }
}

/// Internal path pattern used to reach the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendApi {
    path: Vec<u8>,
    key: String,
}

impl BackendApi {
    pub fn new(path: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let key = derive_key(&path);
        Self { path, key }
    }

    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_consistent(&self) -> bool {
        self.key.as_bytes() == self.path.as_slice()
    }
}

/// Reference to a middleware in the external pipeline.
///
/// The routing core only records which middlewares a router runs; the
/// pipeline itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Middleware {
    pub name: String,
}

impl Middleware {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

/// Order-independent comparison of two middleware chains.
pub fn same_middleware_set(a: &[Arc<Middleware>], b: &[Arc<Middleware>]) -> bool {
    let a: HashSet<&str> = a.iter().map(|m| m.name.as_str()).collect();
    let b: HashSet<&str> = b.iter().map(|m| m.name.as_str()).collect();
    a == b
}

/// Health-check descriptor attached to an endpoint.
///
/// Probing is done elsewhere; the table only carries the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: String,
    pub path: String,
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub retry: bool,
    #[serde(default)]
    pub retry_time: u32,
}

/// Rate-limit descriptor attached to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("1".parse::<Status>().unwrap(), Status::Online);
        assert_eq!("offline".parse::<Status>().unwrap(), Status::Offline);
        assert_eq!(" 2 ".parse::<Status>().unwrap(), Status::BreakDown);
        assert!("up".parse::<Status>().is_err());
        assert_eq!(Status::from(7), Status::Offline);
    }

    #[test]
    fn test_api_key_matches_raw_path() {
        let api = FrontendApi::new("/front/v1");
        assert_eq!(api.key(), "/front/v1");
        assert!(api.is_consistent());
        assert_eq!(api, FrontendApi::new(b"/front/v1".to_vec()));
        assert_ne!(api, FrontendApi::new("/front/v2"));
    }

    #[test]
    fn test_middleware_set_ignores_order() {
        let a = vec![Middleware::new("auth"), Middleware::new("limit")];
        let b = vec![Middleware::new("limit"), Middleware::new("auth")];
        let c = vec![Middleware::new("auth")];
        assert!(same_middleware_set(&a, &b));
        assert!(!same_middleware_set(&a, &c));
    }
}
