//! Keyed concurrent container backing each routing-table map.
//!
//! Single-key operations (`load`, `store`, `delete`, `insert_if_absent`) are
//! individually atomic. Multi-key checks that must not interleave with other
//! writers run inside [`Registry::with_exclusive`], which holds the write lock
//! for the whole closure.

use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct Registry<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().contains_key(key)
    }

    /// Insert or replace, returning the previous value.
    pub fn store(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Insert only when the key is vacant. Returns `false` if it was taken.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Return the value at `key`, creating it with `make` when vacant.
    ///
    /// The boolean is `true` when the value already existed.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> (V, bool) {
        if let Some(existing) = self.inner.read().get(&key) {
            return (existing.clone(), true);
        }
        let mut map = self.inner.write();
        if let Some(existing) = map.get(&key) {
            return (existing.clone(), true);
        }
        let value = make();
        map.insert(key, value.clone());
        (value, false)
    }

    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().remove(key)
    }

    /// Delete the entry only if `pred` accepts the current value.
    pub fn delete_if<Q>(&self, key: &Q, pred: impl FnOnce(&V) -> bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut map = self.inner.write();
        match map.get(key) {
            Some(v) if pred(v) => map.remove(key),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Point-in-time copy of the values.
    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }

    /// Point-in-time copy of the entries.
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.read().keys().cloned().collect()
    }

    /// Run `f` with exclusive access to the whole map.
    pub(crate) fn with_exclusive<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut map = self.inner.write();
        f(&mut map)
    }
}
