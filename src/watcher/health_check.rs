//! Health-check descriptor watcher (`<root>HealthCheck/HealthCheck-<id>/…`).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{StoreError, WatchError};
use crate::routing::HealthCheck;
use crate::store::{ConfigStore, KeyValue};
use crate::watcher::{parse_flag, Attributes, WatchBinding, Watcher, WatcherKind};

pub const ID: &str = "ID";
pub const PATH: &str = "Path";
pub const TIMEOUT: &str = "Timeout";
pub const INTERVAL: &str = "Interval";
pub const RETRY: &str = "Retry";
pub const RETRY_TIME: &str = "RetryTime";

pub const REQUIRED: [&str; 5] = [ID, PATH, TIMEOUT, INTERVAL, RETRY];

pub struct HealthCheckWatcher {
    binding: WatchBinding,
}

impl HealthCheckWatcher {
    pub async fn new(store: Arc<dyn ConfigStore>, root: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            binding: WatchBinding::connect(WatcherKind::HealthCheck, store, root).await?,
        })
    }
}

/// Build a descriptor from a complete attribute set.
pub(crate) fn decode(id: &str, attrs: &Attributes) -> Result<HealthCheck, StoreError> {
    Ok(HealthCheck {
        id: id.to_string(),
        path: attrs.require(PATH)?.to_string(),
        timeout_secs: attrs.parse(TIMEOUT)?,
        interval_secs: attrs.parse(INTERVAL)?,
        retry: parse_flag(attrs.require(RETRY)?),
        retry_time: attrs.parse_opt(RETRY_TIME)?.unwrap_or(0),
    })
}

#[async_trait]
impl Watcher for HealthCheckWatcher {
    fn binding(&self) -> &WatchBinding {
        &self.binding
    }

    async fn put(&self, kv: &KeyValue, is_create: bool) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if is_create && !attrs.complete(&REQUIRED) {
            tracing::debug!(
                health_check = %key.name,
                missing = ?attrs.missing(&REQUIRED),
                "Health check not complete yet"
            );
            return Ok(());
        }

        let health_check = decode(&key.name, &attrs)?;
        table.refresh_health_check(&health_check);
        Ok(())
    }

    async fn delete(&self, kv: &KeyValue) -> Result<(), WatchError> {
        let key = self.binding.parse(kv)?;
        let table = self.binding.table()?;
        let attrs = self.binding.read(&key.name).await?;

        if !attrs.gone(&REQUIRED) {
            tracing::debug!(health_check = %key.name, "Health check deletion still in progress");
            return Ok(());
        }

        let cleared = table.delete_health_check(&key.name);
        tracing::info!(health_check = %key.name, endpoints = cleared, "Health check deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys::Category;
    use crate::store::MemoryStore;
    use crate::watcher::read_attributes;

    #[tokio::test]
    async fn test_decode_defaults_retry_time() {
        let store = MemoryStore::new();
        store.put_all([
            ("/HealthCheck/HealthCheck-hc/ID", "hc"),
            ("/HealthCheck/HealthCheck-hc/Path", "/healthz"),
            ("/HealthCheck/HealthCheck-hc/Timeout", "3"),
            ("/HealthCheck/HealthCheck-hc/Interval", "10"),
            ("/HealthCheck/HealthCheck-hc/Retry", "true"),
        ]);

        let attrs = read_attributes(&store, "/", Category::HealthCheck, "hc").await.unwrap();
        assert!(attrs.complete(&REQUIRED));
        let hc = decode("hc", &attrs).unwrap();
        assert_eq!(hc.path, "/healthz");
        assert_eq!(hc.interval_secs, 10);
        assert!(hc.retry);
        assert_eq!(hc.retry_time, 0);
    }
}
