//! In-process configuration store.
//!
//! Used by tests and by single-node deployments that seed their routes at
//! startup. Writes are delivered to watchers synchronously, so a test can
//! put a key and immediately await the resulting event.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::{ConfigStore, KeyValue, KvState, Subscribers, WatchResponse, WatchStream};

#[derive(Debug, Default)]
struct MemoryState {
    kv: KvState,
    subscribers: Subscribers,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: impl AsRef<[u8]>) {
        let mut state = self.state.lock();
        let event = state.kv.put(key, value.as_ref());
        state.subscribers.publish(&[event]);
    }

    /// Write several keys as one transaction, delivered as a single batch.
    pub fn put_all<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut state = self.state.lock();
        let events: Vec<_> = entries
            .into_iter()
            .map(|(k, v)| state.kv.put(k.as_ref(), v.as_ref()))
            .collect();
        state.subscribers.publish(&events);
    }

    /// Returns false if the key was absent.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.kv.delete(key) {
            Some(event) => {
                state.subscribers.publish(&[event]);
                true
            }
            None => false,
        }
    }

    /// Delete every key under `prefix` as one transaction.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .kv
            .get_prefix(prefix)
            .iter()
            .map(|kv| kv.key_str().into_owned())
            .collect();
        let events: Vec<_> = keys.iter().filter_map(|k| state.kv.delete(k)).collect();
        state.subscribers.publish(&events);
        events.len()
    }

    pub fn get(&self, key: &str) -> Option<KeyValue> {
        self.state.lock().kv.get(key).cloned()
    }

    /// Cancel every open watch, as a store does when it compacts or
    /// loses a client lease.
    pub fn cancel_watches(&self) {
        self.state.lock().subscribers.cancel_all();
    }

    /// Deliver a raw response to the watchers of `prefix`.
    pub fn inject(&self, prefix: &str, response: WatchResponse) {
        self.state.lock().subscribers.inject(prefix, response);
    }

    pub fn watcher_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, StoreError> {
        Ok(self.state.lock().subscribers.subscribe(prefix))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        Ok(self.state.lock().kv.get_prefix(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventKind;

    #[tokio::test]
    async fn test_put_all_is_one_batch() {
        let store = MemoryStore::new();
        let mut rx = store.watch("/Service/").await.unwrap();

        store.put_all([
            ("/Service/Service-a/Name", "a"),
            ("/Service/Service-a/Node", "[]"),
        ]);

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.events.len(), 2);
        assert!(batch.events.iter().all(|e| e.is_create()));
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = MemoryStore::new();
        store.put("/Node/Node-a/Host", "h");
        store.put("/Node/Node-a/Port", "1");
        store.put("/Node/Node-b/Host", "h");
        let mut rx = store.watch("/Node/").await.unwrap();

        assert_eq!(store.delete_prefix("/Node/Node-a/"), 2);
        let batch = rx.recv().await.unwrap();
        assert!(batch.events.iter().all(|e| e.kind == EventKind::Delete));
        assert_eq!(store.len(), 1);
        assert!(!store.delete("/Node/Node-a/Host"));
    }

    #[tokio::test]
    async fn test_cancel_watches_closes_streams() {
        let store = MemoryStore::new();
        let mut rx = store.watch("/Router/").await.unwrap();
        assert_eq!(store.watcher_count(), 1);

        store.cancel_watches();
        assert!(rx.recv().await.unwrap().canceled);
        assert!(rx.recv().await.is_none());
        assert_eq!(store.watcher_count(), 0);
    }
}
