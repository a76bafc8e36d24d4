//! File-backed configuration store.
//!
//! The store is a flat TOML table of full keys:
//! ```toml
//! "/Service/Service-users/Name" = "users"
//! "/Service/Service-users/Node" = ["node-1", "node-2"]
//! "/Node/Node-node-1/Port" = 8080
//! ```
//! Strings are stored as-is, scalars by their text form, and arrays or
//! tables as JSON. On every modification the file is re-read and diffed
//! against the previous snapshot; the resulting puts and deletes are
//! delivered to watchers as one batch.

use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::store::{ConfigStore, KeyValue, KvState, Subscribers, WatchStream};

#[derive(Debug, Default)]
struct FileState {
    kv: KvState,
    subscribers: Subscribers,
}

impl FileState {
    /// Re-read `path` and publish the difference. Returns the number of changes.
    fn reload(&mut self, path: &Path) -> Result<usize, StoreError> {
        let next = read_entries(path)?;

        let mut events = Vec::new();
        for key in self.kv.keys() {
            if !next.contains_key(&key) {
                events.extend(self.kv.delete(&key));
            }
        }
        for (key, value) in &next {
            let unchanged = self.kv.get(key).is_some_and(|kv| &kv.value == value);
            if !unchanged {
                events.push(self.kv.put(key, value));
            }
        }

        self.subscribers.publish(&events);
        Ok(events.len())
    }
}

pub struct FileStore {
    path: PathBuf,
    state: Arc<Mutex<FileState>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileStore {
    /// Load the initial snapshot. Call [`FileStore::start`] to follow changes.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut state = FileState::default();
        let loaded = state.reload(&path)?;
        tracing::info!(path = ?path, keys = loaded, "File store loaded");
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(state)),
            watcher: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Watch the backing file and publish changes as they land.
    pub fn start(&self) -> Result<(), StoreError> {
        let state = Arc::clone(&self.state);
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        match state.lock().reload(&path) {
                            Ok(0) => {}
                            Ok(changes) => tracing::info!(changes, "Store file change applied"),
                            Err(e) => {
                                tracing::error!("Failed to reload store file: {}. Keeping current snapshot.", e)
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Store file watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        *self.watcher.lock() = Some(watcher);

        tracing::info!(path = ?self.path, "File store watcher started");
        Ok(())
    }

    /// Re-read the file now, independent of filesystem notifications.
    pub fn reload(&self) -> Result<usize, StoreError> {
        self.state.lock().reload(&self.path)
    }

    pub fn cancel_watches(&self) {
        self.state.lock().subscribers.cancel_all();
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, StoreError> {
        Ok(self.state.lock().subscribers.subscribe(prefix))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        Ok(self.state.lock().kv.get_prefix(prefix))
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
    let content = fs::read_to_string(path)?;
    let table: BTreeMap<String, toml::Value> = toml::from_str(&content)?;

    table
        .into_iter()
        .map(|(key, value)| {
            let bytes = encode_value(&key, value)?;
            Ok((key, bytes))
        })
        .collect()
}

fn encode_value(key: &str, value: toml::Value) -> Result<Vec<u8>, StoreError> {
    match value {
        toml::Value::String(s) => Ok(s.into_bytes()),
        toml::Value::Integer(i) => Ok(i.to_string().into_bytes()),
        toml::Value::Float(f) => Ok(f.to_string().into_bytes()),
        toml::Value::Boolean(b) => Ok(b.to_string().into_bytes()),
        toml::Value::Datetime(d) => Ok(d.to_string().into_bytes()),
        other => serde_json::to_vec(&other).map_err(|e| StoreError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}
