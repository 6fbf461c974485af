//! Local indexed cache of watched objects
//!
//! The informer owns the single `Writer`; workers read through cloned `Store`
//! handles. Entries are immutable `Arc` snapshots replaced wholesale.

use crate::types::{ChangeEvent, ChangeKind, ResourceKey};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type Cache<K> = Arc<RwLock<HashMap<ResourceKey, Arc<K>>>>;

/// Write side of the cache, driven by the change feed
#[derive(Debug)]
pub struct Writer<K> {
    cache: Cache<K>,
    synced: watch::Sender<bool>,
}

impl<K> Default for Writer<K> {
    fn default() -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            synced: watch::channel(false).0,
        }
    }
}

impl<K> Writer<K> {
    /// Read handle onto this cache
    pub fn as_reader(&self) -> Store<K> {
        Store {
            cache: Arc::clone(&self.cache),
            synced: self.synced.subscribe(),
        }
    }

    /// Apply one change: upsert on ADDED/MODIFIED, remove on DELETED
    pub fn apply(&mut self, event: &ChangeEvent<K>) {
        let mut cache = self.cache.write();
        match event.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                cache.insert(event.key.clone(), Arc::clone(&event.object));
            }
            ChangeKind::Deleted => {
                cache.remove(&event.key);
            }
        }
    }

    /// Complete a (re)list: drop entries the listing did not contain and mark
    /// the cache synced. Returns the dropped keys.
    pub fn replace_finished(&mut self, listed: &HashSet<ResourceKey>) -> Vec<ResourceKey> {
        let pruned = {
            let mut cache = self.cache.write();
            let stale: Vec<ResourceKey> = cache
                .keys()
                .filter(|key| !listed.contains(*key))
                .cloned()
                .collect();
            for key in &stale {
                cache.remove(key);
            }
            stale
        };
        self.synced.send_replace(true);
        pruned
    }
}

/// Cloneable read handle onto the cache
#[derive(Debug)]
pub struct Store<K> {
    cache: Cache<K>,
    synced: watch::Receiver<bool>,
}

impl<K> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            synced: self.synced.clone(),
        }
    }
}

impl<K> Store<K> {
    /// Latest snapshot for `key`
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<K>> {
        self.cache.read().get(key).cloned()
    }

    /// True if `key` is cached
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.cache.read().contains_key(key)
    }

    /// Number of cached objects
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Keys of all cached objects
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.cache.read().keys().cloned().collect()
    }

    /// Snapshots of all cached objects
    pub fn list(&self) -> Vec<Arc<K>> {
        self.cache.read().values().cloned().collect()
    }

    /// True once the first listing has been fully applied
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait for the first listing; false on timeout or if the writer is gone
    pub async fn wait_until_synced(&self, timeout: Duration) -> bool {
        let mut synced = self.synced.clone();
        tokio::time::timeout(timeout, synced.wait_for(|done| *done))
            .await
            .is_ok_and(|result| result.is_ok())
    }
}
