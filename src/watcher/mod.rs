//! Store watchers: one per entity category.
//!
//! # Responsibilities
//! - Subscribe to a category prefix in the configuration store
//! - Decode change events into descriptors and drive the routing table
//! - Gate creates and deletes on the store actually holding (or no
//!   longer holding) every required attribute of the entity
//!
//! # Design Decisions
//! - The category set is closed: route, service, endpoint, health check
//! - Each watcher owns a cancellation token; firing it means
//!   "re-subscribe", never "stop"
//! - Incomplete objects are expected lag and are not reported as errors

pub mod endpoint;
pub mod health_check;
pub mod route;
pub mod service;
pub mod supervisor;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{RoutingError, StoreError, WatchError};
use crate::routing::RoutingTable;
use crate::store::keys::{self, Category, EntityKey};
use crate::store::{ConfigStore, KeyValue, WatchStream};

pub use endpoint::EndpointWatcher;
pub use health_check::HealthCheckWatcher;
pub use route::RouteWatcher;
pub use service::ServiceWatcher;
pub use supervisor::{watch_all, StreamRegistry, Supervisor, SupervisorHandle, WatcherStats, WatcherStatsView};

/// A watch stream shared between a watcher and the task draining it.
/// The stream outlives any single supervised task.
pub type SharedStream = Arc<tokio::sync::Mutex<WatchStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherKind {
    Route,
    Service,
    Endpoint,
    HealthCheck,
}

impl WatcherKind {
    pub const ALL: [WatcherKind; 4] = [
        WatcherKind::Route,
        WatcherKind::Service,
        WatcherKind::Endpoint,
        WatcherKind::HealthCheck,
    ];

    pub fn category(&self) -> Category {
        match self {
            WatcherKind::Route => Category::Router,
            WatcherKind::Service => Category::Service,
            WatcherKind::Endpoint => Category::Node,
            WatcherKind::HealthCheck => Category::HealthCheck,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherKind::Route => "route",
            WatcherKind::Service => "service",
            WatcherKind::Endpoint => "endpoint",
            WatcherKind::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WatcherKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown watcher: {}", s))
    }
}

/// The change-event contract implemented by every category watcher.
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    fn binding(&self) -> &WatchBinding;

    /// Handle a creation or update of one attribute key.
    async fn put(&self, kv: &KeyValue, is_create: bool) -> Result<(), WatchError>;

    /// Handle the deletion of one attribute key.
    async fn delete(&self, kv: &KeyValue) -> Result<(), WatchError>;

    fn kind(&self) -> WatcherKind {
        self.binding().kind()
    }

    fn bind_table(&self, table: Arc<RoutingTable>) {
        self.binding().bind_table(table)
    }

    fn table(&self) -> Option<Arc<RoutingTable>> {
        self.binding().bound_table()
    }

    fn watch_stream(&self) -> SharedStream {
        self.binding().stream()
    }

    fn cancellation(&self) -> CancellationToken {
        self.binding().token()
    }

    /// Re-subscribe with a fresh token and stream.
    async fn refresh(&self) -> Result<(), StoreError> {
        self.binding().refresh().await
    }
}

#[derive(Clone)]
struct Subscription {
    token: CancellationToken,
    stream: SharedStream,
}

/// State shared by all watchers: the store, the key root, the bound
/// table and the current subscription.
pub struct WatchBinding {
    kind: WatcherKind,
    store: Arc<dyn ConfigStore>,
    root: String,
    table: ArcSwapOption<RoutingTable>,
    current: parking_lot::Mutex<Subscription>,
}

impl WatchBinding {
    pub async fn connect(
        kind: WatcherKind,
        store: Arc<dyn ConfigStore>,
        root: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        let prefix = kind.category().watch_prefix(&root);
        let stream = store.watch(&prefix).await?;
        tracing::debug!(watcher = %kind, prefix = %prefix, store = store.name(), "Watch subscribed");
        Ok(Self {
            kind,
            store,
            root,
            table: ArcSwapOption::empty(),
            current: parking_lot::Mutex::new(Subscription {
                token: CancellationToken::new(),
                stream: Arc::new(tokio::sync::Mutex::new(stream)),
            }),
        })
    }

    pub fn kind(&self) -> WatcherKind {
        self.kind
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn prefix(&self) -> String {
        self.kind.category().watch_prefix(&self.root)
    }

    pub fn bind_table(&self, table: Arc<RoutingTable>) {
        self.table.store(Some(table));
    }

    pub fn bound_table(&self) -> Option<Arc<RoutingTable>> {
        self.table.load_full()
    }

    pub fn table(&self) -> Result<Arc<RoutingTable>, WatchError> {
        self.bound_table().ok_or(WatchError::Unbound(self.kind.as_str()))
    }

    fn stream(&self) -> SharedStream {
        Arc::clone(&self.current.lock().stream)
    }

    fn token(&self) -> CancellationToken {
        self.current.lock().token.clone()
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        let stream = self.store.watch(&self.prefix()).await?;
        *self.current.lock() = Subscription {
            token: CancellationToken::new(),
            stream: Arc::new(tokio::sync::Mutex::new(stream)),
        };
        tracing::info!(watcher = %self.kind, "Watch refreshed");
        Ok(())
    }

    pub fn parse(&self, kv: &KeyValue) -> Result<EntityKey, RoutingError> {
        keys::parse_key(&self.root, self.kind.category(), &kv.key_str())
    }

    /// Read every attribute currently stored for `name` in this category.
    pub async fn read(&self, name: &str) -> Result<Attributes, StoreError> {
        read_attributes(self.store.as_ref(), &self.root, self.kind.category(), name).await
    }
}

/// Attribute values of one entity, keyed by attribute name.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    prefix: String,
    values: HashMap<String, String>,
}

impl Attributes {
    /// True when every attribute in `required` is present.
    pub fn complete(&self, required: &[&str]) -> bool {
        required.iter().all(|attr| self.values.contains_key(*attr))
    }

    /// True when none of the attributes in `required` is present.
    pub fn gone(&self, required: &[&str]) -> bool {
        required.iter().all(|attr| !self.values.contains_key(*attr))
    }

    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|attr| !self.values.contains_key(**attr))
            .map(|attr| attr.to_string())
            .collect()
    }

    /// An optional attribute; empty values count as absent.
    pub fn get(&self, attr: &str) -> Option<&str> {
        self.values.get(attr).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn require(&self, attr: &str) -> Result<&str, StoreError> {
        self.values
            .get(attr)
            .map(String::as_str)
            .ok_or_else(|| self.decode_error(attr, "missing"))
    }

    pub fn parse<T>(&self, attr: &str) -> Result<T, StoreError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.require(attr)?;
        raw.trim().parse().map_err(|e: T::Err| self.decode_error(attr, e))
    }

    pub fn parse_opt<T>(&self, attr: &str) -> Result<Option<T>, StoreError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(attr) {
            Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| self.decode_error(attr, e)),
            None => Ok(None),
        }
    }

    pub fn json<T: DeserializeOwned>(&self, attr: &str) -> Result<T, StoreError> {
        let raw = self.require(attr)?;
        serde_json::from_str(raw).map_err(|e| self.decode_error(attr, e))
    }

    pub fn json_opt<T: DeserializeOwned>(&self, attr: &str) -> Result<Option<T>, StoreError> {
        match self.get(attr) {
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| self.decode_error(attr, e)),
            None => Ok(None),
        }
    }

    fn decode_error(&self, attr: &str, reason: impl fmt::Display) -> StoreError {
        StoreError::Decode {
            key: format!("{}{}", self.prefix, attr),
            reason: reason.to_string(),
        }
    }
}

pub(crate) async fn read_attributes(
    store: &dyn ConfigStore,
    root: &str,
    category: Category,
    name: &str,
) -> Result<Attributes, StoreError> {
    let prefix = category.entity_prefix(root, name);
    let values = store
        .get_prefix(&prefix)
        .await?
        .into_iter()
        .filter_map(|kv| {
            let key = kv.key_str();
            let attr = key.strip_prefix(prefix.as_str())?.to_string();
            Some((attr, kv.value_str().into_owned()))
        })
        .collect();
    Ok(Attributes { prefix, values })
}

/// Replay every entity already in the store through `put` as a create.
/// Run once after subscribing so state written before startup is applied.
pub async fn sync_existing(watcher: &dyn Watcher) -> Result<usize, StoreError> {
    let binding = watcher.binding();
    let kvs = binding.store().get_prefix(&binding.prefix()).await?;
    let mut seen = HashSet::new();
    let mut applied = 0;

    for kv in kvs {
        let Ok(key) = binding.parse(&kv) else {
            continue;
        };
        if !seen.insert(key.name.clone()) {
            continue;
        }
        match watcher.put(&kv, true).await {
            Ok(()) => applied += 1,
            Err(e) => tracing::warn!(watcher = %binding.kind(), entity = %key.name, error = %e, "Initial sync failed"),
        }
    }

    tracing::info!(watcher = %binding.kind(), entities = applied, "Initial sync complete");
    Ok(applied)
}

/// Loose boolean decoding: `1`/`true`/`yes` are true.
pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_attributes_gate() {
        let store = MemoryStore::new();
        store.put("/Service/Service-a/Name", "a");

        let attrs = read_attributes(&store, "/", Category::Service, "a").await.unwrap();
        assert!(!attrs.complete(&["Name", "Node"]));
        assert!(!attrs.gone(&["Name", "Node"]));
        assert_eq!(attrs.missing(&["Name", "Node"]), vec!["Node".to_string()]);

        store.put("/Service/Service-a/Node", r#"["n1"]"#);
        let attrs = read_attributes(&store, "/", Category::Service, "a").await.unwrap();
        assert!(attrs.complete(&["Name", "Node"]));
        let nodes: Vec<String> = attrs.json("Node").unwrap();
        assert_eq!(nodes, vec!["n1"]);

        store.delete_prefix("/Service/Service-a/");
        let attrs = read_attributes(&store, "/", Category::Service, "a").await.unwrap();
        assert!(attrs.gone(&["Name", "Node"]));
    }

    #[tokio::test]
    async fn test_decode_errors_name_the_key() {
        let store = MemoryStore::new();
        store.put("/Node/Node-n1/Port", "eighty");
        let attrs = read_attributes(&store, "/", Category::Node, "n1").await.unwrap();
        let err = attrs.parse::<u16>("Port").unwrap_err();
        assert!(err.to_string().contains("/Node/Node-n1/Port"));
        assert!(attrs.parse_opt::<u16>("RetryTime").unwrap().is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("True"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
