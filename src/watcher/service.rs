//! Service watcher (`<root>Service/Service-<name>/…`).

use async_trait::async_trait;
use axum::http::Method;
use std::sync::Arc;

use crate::error::{RoutingError, StoreError, WatchError};
use crate::routing::descriptor::ServiceDescriptor;
use crate::routing::RoutingTable;
use crate::store::{ConfigStore, KeyValue};
use crate::watcher::{route, Attributes, WatchBinding, Watcher, WatcherKind};

pub const NAME: &str = "Name";
pub const NODE: &str = "Node";
pub const ACCEPT_METHOD: &str = "AcceptMethod";

pub const REQUIRED: [&str; 2] = [NAME, NODE];

pub struct ServiceWatcher {
    binding: WatchBinding,
}

impl ServiceWatcher {
    pub async fn new(store: Arc<dyn ConfigStore>, root: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            binding: WatchBinding::connect(WatcherKind::Service, store, root).await?,
        })
    }

    /// Re-apply every router record naming this service. Creates routers
    /// whose records arrived first and rebinds routers left detached by an
    /// earlier removal of the service. Routers already in sync are untouched.
    async fn adopt_routers(&self, table: &RoutingTable, service: &str) -> Result<(), StoreError> {
        let records = route::routers_for_service(self.binding.store().as_ref(), self.binding.root(), service).await?;
        for desc in records {
            let known = table.get_router_by_name(&desc.name).is_ok();
            match table.refresh_router(&desc) {
                Ok(_) if !known => tracing::info!(router = %desc.name, service = %service, "Pending router adopted"),
                Ok(_) => {}
                Err(e) => tracing::warn!(router = %desc.name, error = %e, "Router not applied for service"),
            }
        }
        Ok(())
    }
}

pub(crate) fn decode(name: &str, attrs: &Attributes) -> Result<ServiceDescriptor, StoreError> {
    let methods: Vec<String> = attrs.json_opt(ACCEPT_METHOD)?.unwrap_or_default();
    let accepted_methods = methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| StoreError::Decode {
                key: ACCEPT_METHOD.to_string(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ServiceDescriptor {
        name: name.to_string(),
        accepted_methods,
        endpoints: attrs.json(NODE)?,
    })
}

#[async_trait]
impl Watcher for ServiceWatcher {
    fn binding(&self) -> &WatchBinding {
        &self.binding
    }

    async fn put(&self, kv: &KeyValue, is_create: bool) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if is_create && !attrs.complete(&REQUIRED) {
            tracing::debug!(
                service = %key.name,
                missing = ?attrs.missing(&REQUIRED),
                "Service not complete yet"
            );
            return Ok(());
        }

        let desc = decode(&key.name, &attrs)?;
        table.refresh_service(&desc);
        self.adopt_routers(&table, &key.name).await?;
        Ok(())
    }

    async fn delete(&self, kv: &KeyValue) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if !attrs.gone(&REQUIRED) {
            tracing::debug!(service = %key.name, "Service deletion still in progress");
            return Ok(());
        }

        match table.delete_service(&key.name) {
            Ok(()) => {
                tracing::info!(service = %key.name, "Service deleted");
                Ok(())
            }
            Err(RoutingError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
