//! Type-erased cache storage for fetched values.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Thread-safe, type-erased storage for the last value fetched per key.
///
/// Values of any type live side by side. Reading a key with a type other than
/// the one it was written with behaves as if the key were absent.
#[derive(Default)]
pub struct CacheStorage {
    /// Map from key to type-erased Arc<T>
    entries: RwLock<HashMap<Arc<str>, Arc<dyn Any + Send + Sync>>>,
}

impl CacheStorage {
    /// Create a new empty cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached value if present.
    ///
    /// Returns `None` if not cached or if the type doesn't match.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .and_then(|arc| arc.clone().downcast::<T>().ok())
    }

    /// Returns `true` if any value is stored under `key`, whatever its type.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Insert a value into the cache, replacing the previous one.
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<Arc<str>>, value: Arc<T>) {
        self.entries
            .write()
            .insert(key.into(), value as Arc<dyn Any + Send + Sync>);
    }

    /// Remove a value from the cache.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Clear all cached values.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All cached keys, in no particular order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.entries.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("keys", &self.keys())
            .finish()
    }
}
