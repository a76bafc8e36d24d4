//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configuration store named by the config
//! - Build the routing table and bind one watcher per enabled category
//! - Replay existing store state, then hand watchers to the supervisor
//! - Serve the admin API until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Watchers subscribe before the initial sync so nothing written in
//!   between is lost; replaying it twice is harmless
//! - Watchers are created in dependency order: health checks, endpoints,
//!   services, routes

use std::future::Future;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{self, AdminState};
use crate::config::{ConfigError, GatewayConfig, StoreBackend, StoreConfig};
use crate::error::{StoreError, WatchError};
use crate::routing::RoutingTable;
use crate::store::{ConfigStore, FileStore, MemoryStore};
use crate::watcher::{
    sync_existing, watch_all, EndpointWatcher, HealthCheckWatcher, RouteWatcher, ServiceWatcher,
    StreamRegistry, SupervisorHandle, Watcher,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A running gateway: table, store and supervised watchers.
pub struct Gateway {
    pub config: GatewayConfig,
    pub table: Arc<RoutingTable>,
    pub store: Arc<dyn ConfigStore>,
    pub supervisor: Arc<SupervisorHandle>,
}

impl Gateway {
    pub fn admin_state(&self) -> AdminState {
        AdminState::new(
            Arc::clone(&self.table),
            Some(Arc::clone(&self.supervisor)),
            self.config.admin.api_key.clone(),
        )
    }

    /// Serve the admin API (if enabled) until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), StartupError> {
        if self.config.admin.enabled {
            let listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            admin::serve(listener, self.admin_state(), shutdown).await?;
        } else {
            shutdown.await;
        }

        self.supervisor.shutdown();
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ConfigStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("file backend requires store.path".to_string()))?;
            let store = FileStore::open(path)?;
            store.start()?;
            Ok(Arc::new(store))
        }
    }
}

/// Open the configured store and start the gateway on it.
pub async fn start(config: GatewayConfig) -> Result<Gateway, StartupError> {
    let store = open_store(&config.store)?;
    start_with_store(config, store).await
}

/// Start the gateway on an already opened store.
pub async fn start_with_store(config: GatewayConfig, store: Arc<dyn ConfigStore>) -> Result<Gateway, StartupError> {
    let table = Arc::new(RoutingTable::default());
    let root = config.store.root.clone();
    let enabled = &config.watchers;

    let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();
    if enabled.health_check {
        watchers.push(Arc::new(HealthCheckWatcher::new(Arc::clone(&store), root.clone()).await?));
    }
    if enabled.endpoint {
        watchers.push(Arc::new(EndpointWatcher::new(Arc::clone(&store), root.clone()).await?));
    }
    if enabled.service {
        watchers.push(Arc::new(ServiceWatcher::new(Arc::clone(&store), root.clone()).await?));
    }
    if enabled.route {
        watchers.push(Arc::new(RouteWatcher::new(Arc::clone(&store), root.clone()).await?));
    }

    for watcher in &watchers {
        watcher.bind_table(Arc::clone(&table));
    }
    for watcher in &watchers {
        sync_existing(watcher.as_ref()).await?;
    }

    let count = watchers.len();
    let supervisor = watch_all(Arc::new(StreamRegistry::new()), watchers)?;

    tracing::info!(
        store = store.name(),
        root = %root,
        watchers = count,
        routes = table.route_count(),
        online = table.online_count(),
        "Gateway started"
    );

    Ok(Gateway {
        config,
        table,
        store,
        supervisor: Arc::new(supervisor),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_on_memory_store() {
        let mut config = GatewayConfig::default();
        config.watchers.health_check = false;

        let gateway = start(config).await.unwrap();
        assert_eq!(gateway.store.name(), "memory");
        assert_eq!(gateway.supervisor.kinds().len(), 3);
        assert_eq!(gateway.table.route_count(), 0);
        gateway.supervisor.shutdown();
    }

    #[test]
    fn test_file_backend_requires_path() {
        let config = StoreConfig {
            backend: StoreBackend::File,
            path: None,
            root: "/".to_string(),
        };
        assert!(matches!(open_store(&config), Err(StoreError::Unavailable(_))));
    }
}
