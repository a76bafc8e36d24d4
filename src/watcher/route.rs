//! Router watcher (`<root>Router/Router-<name>/…`).
//!
//! A router record names its service. If the service is not in the table
//! yet the refresh fails with `NotFound`; the service watcher picks the
//! router up again once the service lands (see [`routers_for_service`]).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{RoutingError, StoreError, WatchError};
use crate::routing::descriptor::RouterDescriptor;
use crate::routing::{RoutingTable, Status};
use crate::store::keys::{self, Category};
use crate::store::{ConfigStore, KeyValue};
use crate::watcher::{read_attributes, Attributes, WatchBinding, Watcher, WatcherKind};

pub const NAME: &str = "Name";
pub const FRONTEND_API: &str = "FrontendApi";
pub const BACKEND_API: &str = "BackendApi";
pub const SERVICE: &str = "Service";
pub const STATUS: &str = "Status";
pub const MIDDLEWARE: &str = "Middleware";

pub const REQUIRED: [&str; 5] = [NAME, FRONTEND_API, BACKEND_API, SERVICE, STATUS];

pub struct RouteWatcher {
    binding: WatchBinding,
}

impl RouteWatcher {
    pub async fn new(store: Arc<dyn ConfigStore>, root: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            binding: WatchBinding::connect(WatcherKind::Route, store, root).await?,
        })
    }
}

pub(crate) fn decode(name: &str, attrs: &Attributes) -> Result<RouterDescriptor, StoreError> {
    Ok(RouterDescriptor {
        name: name.to_string(),
        frontend: attrs.require(FRONTEND_API)?.to_string(),
        backend: attrs.require(BACKEND_API)?.to_string(),
        service: attrs.require(SERVICE)?.to_string(),
        status: attrs.parse::<Status>(STATUS)?,
        middlewares: attrs.json_opt(MIDDLEWARE)?.unwrap_or_default(),
    })
}

/// Complete router records in the store that reference `service`.
pub(crate) async fn routers_for_service(
    store: &dyn ConfigStore,
    root: &str,
    service: &str,
) -> Result<Vec<RouterDescriptor>, StoreError> {
    let suffix = format!("/{}", SERVICE);
    let mut descriptors = Vec::new();

    for kv in store.get_prefix(&Category::Router.watch_prefix(root)).await? {
        let key = kv.key_str();
        if !key.ends_with(&suffix) || kv.value_str() != service {
            continue;
        }
        let Ok(entity) = keys::parse_key(root, Category::Router, &key) else {
            continue;
        };
        let attrs = read_attributes(store, root, Category::Router, &entity.name).await?;
        if attrs.complete(&REQUIRED) {
            descriptors.push(decode(&entity.name, &attrs)?);
        }
    }
    Ok(descriptors)
}

/// Take a router out of service and unregister it.
fn retire(table: &RoutingTable, name: &str) -> Result<(), RoutingError> {
    let router = table.get_router_by_name(name)?;
    if router.is_online() {
        if let Some(frontend) = router.frontend() {
            table.set_router_status(frontend.key(), Status::Offline)?;
            tracing::info!(router = %name, path = %frontend.key(), "Router demoted before deletion");
        }
    }
    table.delete_router(name)
}

#[async_trait]
impl Watcher for RouteWatcher {
    fn binding(&self) -> &WatchBinding {
        &self.binding
    }

    async fn put(&self, kv: &KeyValue, is_create: bool) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if is_create && !attrs.complete(&REQUIRED) {
            tracing::debug!(
                router = %key.name,
                missing = ?attrs.missing(&REQUIRED),
                "Router not complete yet"
            );
            return Ok(());
        }

        let desc = decode(&key.name, &attrs)?;
        table.refresh_router(&desc)?;
        Ok(())
    }

    async fn delete(&self, kv: &KeyValue) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if !attrs.gone(&REQUIRED) {
            tracing::debug!(router = %key.name, "Router deletion still in progress");
            return Ok(());
        }

        match retire(&table, &key.name) {
            Ok(()) => {
                tracing::info!(router = %key.name, "Router deleted");
                Ok(())
            }
            // Optional attributes deleted after the required ones.
            Err(RoutingError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn seed(store: &MemoryStore, name: &str, service: &str) {
        store.put_all([
            (format!("/Router/Router-{name}/Name"), name.to_string()),
            (format!("/Router/Router-{name}/FrontendApi"), format!("/{name}")),
            (format!("/Router/Router-{name}/BackendApi"), "/".to_string()),
            (format!("/Router/Router-{name}/Service"), service.to_string()),
            (format!("/Router/Router-{name}/Status"), "1".to_string()),
        ]);
    }

    #[tokio::test]
    async fn test_routers_for_service() {
        let store = MemoryStore::new();
        seed(&store, "a", "users");
        seed(&store, "b", "orders");
        store.put("/Router/Router-c/Service", "users");
        store.put("/Router/Router-a/Middleware", r#"["auth"]"#);

        let found = routers_for_service(&store, "/", "users").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
        assert_eq!(found[0].status, Status::Online);
        assert_eq!(found[0].middlewares, vec!["auth".to_string()]);
    }
}
