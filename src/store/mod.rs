//! Configuration store contract.
//!
//! # Data Flow
//! ```text
//! store backend (memory.rs / file.rs)
//!     → put/delete mutate a revisioned key space (KvState)
//!     → Subscribers fan events out to prefix-scoped watch streams
//!     → watchers consume WatchResponse batches
//!
//! watchers also issue point reads (get_prefix) to check that
//! all attributes of an entity are present before committing.
//! ```
//!
//! # Design Decisions
//! - Keys and values are raw bytes; revisions follow etcd semantics
//!   (a put is a create when `create_revision == mod_revision`)
//! - A canceled response or a closed stream both mean "re-subscribe"

pub mod file;
pub mod keys;
pub mod memory;

use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::error::StoreError;

pub use file::FileStore;
pub use keys::Category;
pub use memory::MemoryStore;

/// A stored key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub create_revision: i64,
    pub mod_revision: i64,
}

impl KeyValue {
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Kind of change carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
    /// A raw event type this core does not understand.
    Unknown(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub kv: KeyValue,
}

impl WatchEvent {
    /// True for the first put of a key.
    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Put && self.kv.create_revision == self.kv.mod_revision
    }
}

/// One batch delivered on a watch stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchResponse {
    pub events: Vec<WatchEvent>,
    /// The store canceled this watch; the subscriber must re-subscribe.
    pub canceled: bool,
}

pub type WatchStream = mpsc::UnboundedReceiver<WatchResponse>;

/// A watchable, prefix-scoped key/value store.
// async_trait: watchers hold the store as Arc<dyn ConfigStore>.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Subscribe to changes of every key under `prefix`.
    async fn watch(&self, prefix: &str) -> Result<WatchStream, StoreError>;

    /// Point read of every key under `prefix`, ordered by key.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError>;
}

/// Revisioned key space shared by the store backends.
#[derive(Debug, Default)]
pub(crate) struct KvState {
    revision: i64,
    data: BTreeMap<String, KeyValue>,
}

impl KvState {
    pub(crate) fn put(&mut self, key: &str, value: &[u8]) -> WatchEvent {
        self.revision += 1;
        let create_revision = self
            .data
            .get(key)
            .map(|kv| kv.create_revision)
            .unwrap_or(self.revision);
        let kv = KeyValue {
            key: key.as_bytes().to_vec(),
            value: value.to_vec(),
            create_revision,
            mod_revision: self.revision,
        };
        self.data.insert(key.to_string(), kv.clone());
        WatchEvent { kind: EventKind::Put, kv }
    }

    pub(crate) fn delete(&mut self, key: &str) -> Option<WatchEvent> {
        self.data.remove(key)?;
        self.revision += 1;
        Some(WatchEvent {
            kind: EventKind::Delete,
            kv: KeyValue {
                key: key.as_bytes().to_vec(),
                value: Vec::new(),
                create_revision: 0,
                mod_revision: self.revision,
            },
        })
    }

    pub(crate) fn get(&self, key: &str) -> Option<&KeyValue> {
        self.data.get(key)
    }

    pub(crate) fn get_prefix(&self, prefix: &str) -> Vec<KeyValue> {
        self.data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, kv)| kv.clone())
            .collect()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}

/// Prefix-scoped watch subscribers.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    subs: Vec<(String, mpsc::UnboundedSender<WatchResponse>)>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self, prefix: &str) -> WatchStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs.push((prefix.to_string(), tx));
        rx
    }

    /// Deliver the events matching each subscriber's prefix as one batch.
    /// Subscribers whose stream was dropped are pruned.
    pub(crate) fn publish(&mut self, events: &[WatchEvent]) {
        if events.is_empty() {
            return;
        }
        self.subs.retain(|(prefix, tx)| {
            let matching: Vec<WatchEvent> = events
                .iter()
                .filter(|e| e.kv.key.starts_with(prefix.as_bytes()))
                .cloned()
                .collect();
            if matching.is_empty() {
                return !tx.is_closed();
            }
            tx.send(WatchResponse { events: matching, canceled: false }).is_ok()
        });
    }

    /// Cancel every watch. Streams receive a canceled response, then close.
    pub(crate) fn cancel_all(&mut self) {
        for (_, tx) in self.subs.drain(..) {
            let _ = tx.send(WatchResponse { events: Vec::new(), canceled: true });
        }
    }

    /// Push a raw response to every subscriber of `prefix`.
    pub(crate) fn inject(&mut self, prefix: &str, response: WatchResponse) {
        self.subs
            .retain(|(p, tx)| p != prefix || tx.send(response.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.subs.len()
    }
}
