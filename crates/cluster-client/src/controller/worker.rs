//! Reconciliation workers
//!
//! Each worker pulls keys from the shared queue, looks the object up in the
//! cache and hands it to a `Reconcile` implementation. Failed keys are retried
//! with backoff until they exceed the retry budget, then dropped.

use super::queue::WorkQueue;
use super::store::Store;
use crate::types::ResourceKey;
use kube::Resource;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Action taken for each changed key
///
/// Implementations must be idempotent: a key can be reconciled many times for
/// one logical change and the object passed in may already be stale.
#[async_trait::async_trait]
pub trait Reconcile<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    type Error: Display + Send;

    /// Called with the cached snapshot of a present object
    async fn reconcile(&self, key: &ResourceKey, obj: Arc<K>) -> Result<(), Self::Error>;

    /// Called when the key is no longer in the cache
    async fn deleted(&self, key: &ResourceKey) -> Result<(), Self::Error> {
        let _ = key;
        Ok(())
    }
}

/// Reconciler that only logs what it sees
#[derive(Debug, Clone, Copy)]
pub struct LogSync<K> {
    _kind: PhantomData<fn() -> K>,
}

impl<K> LogSync<K> {
    /// Create a logging reconciler
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<K> Default for LogSync<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<K> Reconcile<K> for LogSync<K>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    type Error = std::convert::Infallible;

    async fn reconcile(&self, key: &ResourceKey, _obj: Arc<K>) -> Result<(), Self::Error> {
        info!(
            "sync/add/update for {} {}",
            K::kind(&()).to_lowercase(),
            key
        );
        Ok(())
    }
}

/// One worker loop over a shared queue and cache
pub struct Worker<K, R: ?Sized> {
    id: usize,
    queue: WorkQueue<ResourceKey>,
    store: Store<K>,
    reconciler: Arc<R>,
    max_retries: u32,
}

impl<K, R: ?Sized> std::fmt::Debug for Worker<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl<K, R> Worker<K, R>
where
    K: Send + Sync + 'static,
    R: Reconcile<K> + ?Sized,
{
    /// Create worker `id` over a shared queue and cache
    pub fn new(
        id: usize,
        queue: WorkQueue<ResourceKey>,
        store: Store<K>,
        reconciler: Arc<R>,
        max_retries: u32,
    ) -> Self {
        Self {
            id,
            queue,
            store,
            reconciler,
            max_retries,
        }
    }

    /// Process items until the queue shuts down
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");
        while self.process_next_item().await {}
        debug!(worker = self.id, "Worker stopped");
    }

    /// Take one key off the queue and reconcile it.
    ///
    /// Returns false once the queue has shut down.
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let result = match self.store.get(&key) {
            Some(obj) => self.reconciler.reconcile(&key, obj).await,
            None => {
                info!("{} does not exist anymore", key);
                self.reconciler.deleted(&key).await
            }
        };

        self.handle_result(&key, result);
        self.queue.done(&key);
        true
    }

    fn handle_result(&self, key: &ResourceKey, result: Result<(), R::Error>) {
        match result {
            Ok(()) => self.queue.forget(key),
            Err(e) if self.queue.num_requeues(key) < self.max_retries => {
                warn!(worker = self.id, "Error syncing {}: {}", key, e);
                self.queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                self.queue.forget(key);
                error!(worker = self.id, "Dropping {} out of the queue: {}", key, e);
            }
        }
    }
}
