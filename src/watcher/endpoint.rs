//! Endpoint watcher (`<root>Node/Node-<id>/…`).
//!
//! Besides refreshing the endpoint itself, a put resolves the referenced
//! health check from the store and binds the endpoint into every service
//! whose `Node` list already names it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{RoutingError, StoreError, WatchError};
use crate::routing::descriptor::EndpointDescriptor;
use crate::routing::{HealthCheck, RoutingTable, Status};
use crate::store::keys::{self, Category};
use crate::store::{ConfigStore, KeyValue};
use crate::watcher::{health_check, read_attributes, service, Attributes, WatchBinding, Watcher, WatcherKind};

pub const ID: &str = "ID";
pub const NAME: &str = "Name";
pub const HOST: &str = "Host";
pub const PORT: &str = "Port";
pub const STATUS: &str = "Status";
pub const HEALTH_CHECK: &str = "HealthCheck";
pub const RATE_LIMIT: &str = "RateLimit";

pub const REQUIRED: [&str; 5] = [ID, NAME, HOST, PORT, STATUS];

pub struct EndpointWatcher {
    binding: WatchBinding,
}

impl EndpointWatcher {
    pub async fn new(store: Arc<dyn ConfigStore>, root: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            binding: WatchBinding::connect(WatcherKind::Endpoint, store, root).await?,
        })
    }

    async fn resolve_health_check(&self, id: &str) -> Result<Option<HealthCheck>, StoreError> {
        let store = self.binding.store().as_ref();
        let attrs = read_attributes(store, self.binding.root(), Category::HealthCheck, id).await?;
        if !attrs.complete(&health_check::REQUIRED) {
            return Ok(None);
        }
        health_check::decode(id, &attrs).map(Some)
    }

    /// Attach the endpoint to services in the store whose `Node` list names it.
    async fn bind_services(&self, table: &RoutingTable, endpoint: &str) -> Result<usize, StoreError> {
        let root = self.binding.root();
        let suffix = format!("/{}", service::NODE);
        let mut bound = 0;

        for kv in self.binding.store().get_prefix(&Category::Service.watch_prefix(root)).await? {
            let key = kv.key_str();
            if !key.ends_with(&suffix) {
                continue;
            }
            let Ok(nodes) = serde_json::from_slice::<Vec<String>>(&kv.value) else {
                continue;
            };
            if !nodes.iter().any(|n| n == endpoint) {
                continue;
            }
            let Ok(entity) = keys::parse_key(root, Category::Service, &key) else {
                continue;
            };
            match table.bind_endpoint(&entity.name, endpoint) {
                Ok(()) => bound += 1,
                Err(e) => tracing::debug!(service = %entity.name, endpoint = %endpoint, error = %e, "Endpoint not bound"),
            }
        }
        Ok(bound)
    }
}

pub(crate) fn decode(id: &str, attrs: &Attributes) -> Result<EndpointDescriptor, StoreError> {
    Ok(EndpointDescriptor {
        name: id.to_string(),
        host: attrs.require(HOST)?.to_string(),
        port: attrs.parse(PORT)?,
        status: attrs.parse::<Status>(STATUS)?,
        health_check_id: attrs.get(HEALTH_CHECK).map(str::to_string),
        health_check: None,
        rate_limit: attrs.json_opt(RATE_LIMIT)?,
    })
}

#[async_trait]
impl Watcher for EndpointWatcher {
    fn binding(&self) -> &WatchBinding {
        &self.binding
    }

    async fn put(&self, kv: &KeyValue, is_create: bool) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if is_create && !attrs.complete(&REQUIRED) {
            tracing::debug!(
                endpoint = %key.name,
                missing = ?attrs.missing(&REQUIRED),
                "Endpoint not complete yet"
            );
            return Ok(());
        }

        let mut desc = decode(&key.name, &attrs)?;
        if let Some(id) = desc.health_check_id.as_deref() {
            desc.health_check = self.resolve_health_check(id).await?;
        }

        let endpoint = table.refresh_endpoint(&desc);
        let bound = self.bind_services(&table, &key.name).await?;
        tracing::debug!(endpoint = %key.name, address = %endpoint.address(), services = bound, "Endpoint applied");
        Ok(())
    }

    async fn delete(&self, kv: &KeyValue) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if !attrs.gone(&REQUIRED) {
            tracing::debug!(endpoint = %key.name, "Endpoint deletion still in progress");
            return Ok(());
        }

        match table.delete_endpoint(&key.name) {
            Ok(()) => {
                tracing::info!(endpoint = %key.name, "Endpoint deleted");
                Ok(())
            }
            Err(RoutingError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
