//! Bounded LRU cache of open resources
//!
//! The cache owns every resource it holds. Callers only get a `&mut` borrow for the
//! duration of a closure run under the cache lock, so an eviction triggered by another
//! thread can never close a resource that is still in use.

use crate::Result;
use lru::LruCache;
use std::fmt;
use std::hash::Hash;
use std::io;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// A resource that must be released explicitly when evicted
pub trait CachedResource {
    fn close(self) -> io::Result<()>;
}

pub struct HandleCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V>>,
}

impl<K, V> HandleCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Display,
    V: CachedResource,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Run `use_entry` on the resource of `key`, opening it first on a miss
    ///
    /// A miss on a full cache closes the least recently used resource before opening the
    /// new one. A hit marks the entry as most recently used.
    pub fn with_entry<T>(
        &self,
        key: &K,
        open: impl FnOnce() -> io::Result<V>,
        use_entry: impl FnOnce(&mut V) -> Result<T>,
    ) -> Result<T> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if !entries.contains(key)
            && entries.len() >= entries.cap().get()
            && let Some((evicted, resource)) = entries.pop_lru()
        {
            tracing::debug!("Evicting cached handles of {}", evicted);
            resource.close()?;
        }

        let resource = entries.try_get_or_insert_mut(key.clone(), || {
            tracing::debug!("Opening handles of {}", key);
            open()
        })?;
        use_entry(resource)
    }

    /// Close and forget the resource of `key`, if cached
    pub fn remove(&self, key: &K) -> Result<()> {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(key);
        if let Some(resource) = removed {
            resource.close()?;
        }
        Ok(())
    }

    /// Run `visit` on every cached resource, most recently used first
    pub fn for_each(&self, mut visit: impl FnMut(&K, &mut V) -> Result<()>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, resource) in entries.iter_mut() {
            visit(key, resource)?;
        }
        Ok(())
    }

    /// Whether `key` is cached, without touching its recency
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
