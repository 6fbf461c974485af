//! Watch-driven reconciliation controller
//!
//! Wires a change feed into a local cache and a work queue, then drains the
//! queue with a fixed pool of workers:
//!
//! ```text
//! ResourceClient -> ChangeFeed -> Writer (cache) -> WorkQueue -> Worker -> Reconcile
//! ```
//!
//! Workers only start once the first listing has been applied to the cache.

pub mod feed;
pub mod queue;
pub mod rate_limiter;
pub mod store;
pub mod worker;
#[cfg(test)]
mod controller_test;
#[cfg(test)]
mod feed_test;

pub use feed::{ChangeFeed, FeedEvent};
pub use queue::WorkQueue;
pub use rate_limiter::ItemExponentialRateLimiter;
pub use store::{Store, Writer};
pub use worker::{LogSync, Reconcile, Worker};

use crate::backoff::ExponentialBackoff;
use crate::error::RunError;
use crate::resource_trait::ResourceClient;
use crate::types::ResourceKey;
use kube::Resource;
use kube::api::{ListParams, WatchParams};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Tuning for a controller run
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Failed attempts retried before a key is dropped
    pub max_retries: u32,
    /// How long to wait for the first listing before giving up
    pub cache_sync_timeout: Duration,
    /// Server-side watch timeout in seconds; must stay below 295
    pub watch_timeout_secs: u32,
    /// Only watch objects matching this label selector
    pub label_selector: Option<String>,
    /// First delay when a list or watch call fails
    pub reconnect_base_delay: Duration,
    /// Ceiling on list/watch retry delays
    pub reconnect_max_delay: Duration,
    /// First requeue delay for a failed key
    pub retry_base_delay: Duration,
    /// Ceiling on requeue delays
    pub retry_max_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 5,
            cache_sync_timeout: Duration::from_secs(60),
            watch_timeout_secs: 290,
            label_selector: None,
            reconnect_base_delay: Duration::from_millis(800),
            reconnect_max_delay: Duration::from_secs(30),
            retry_base_delay: rate_limiter::DEFAULT_BASE_DELAY,
            retry_max_delay: rate_limiter::DEFAULT_MAX_DELAY,
        }
    }
}

impl ControllerConfig {
    /// Number of concurrent workers
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Failed attempts retried before a key is dropped
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Deadline for the first listing
    #[must_use]
    pub fn cache_sync_timeout(mut self, timeout: Duration) -> Self {
        self.cache_sync_timeout = timeout;
        self
    }

    /// Restrict the watch to objects matching a label selector
    #[must_use]
    pub fn labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }

    /// Delay range for list/watch retries
    #[must_use]
    pub fn reconnect_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    /// Delay range for requeueing failed keys
    #[must_use]
    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    fn list_params(&self) -> ListParams {
        match &self.label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        }
    }

    fn watch_params(&self) -> WatchParams {
        let params = WatchParams::default().timeout(self.watch_timeout_secs);
        match &self.label_selector {
            Some(selector) => params.labels(selector),
            None => params,
        }
    }
}

/// A list+watch controller for one resource kind in one namespace
pub struct Controller<K, C: ?Sized, R: ?Sized> {
    client: Arc<C>,
    reconciler: Arc<R>,
    config: ControllerConfig,
    writer: Writer<K>,
}

impl<K, C: ?Sized, R: ?Sized> std::fmt::Debug for Controller<K, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K, C, R> Controller<K, C, R>
where
    K: Resource + Clone + Send + Sync + 'static,
    C: ResourceClient<K> + ?Sized + 'static,
    R: Reconcile<K> + ?Sized + 'static,
{
    /// Create a controller; nothing runs until `run`
    pub fn new(client: Arc<C>, reconciler: Arc<R>, config: ControllerConfig) -> Self {
        Self {
            client,
            reconciler,
            config,
            writer: Writer::default(),
        }
    }

    /// Read handle onto the controller's cache
    pub fn store(&self) -> Store<K> {
        self.writer.as_reader()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Fails if the cache does not sync within the configured timeout. On
    /// shutdown, in-flight reconciliations finish before this returns.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RunError> {
        let Self {
            client,
            reconciler,
            config,
            writer,
        } = self;
        let store = writer.as_reader();
        let namespace = client.namespace().to_string();

        let queue = WorkQueue::new(ItemExponentialRateLimiter::new(
            config.retry_base_delay,
            config.retry_max_delay,
        ));
        let feed = ChangeFeed::new(
            client,
            config.list_params(),
            config.watch_params(),
            ExponentialBackoff::new(config.reconnect_base_delay, config.reconnect_max_delay),
        );
        let informer_token = shutdown.child_token();
        let informer = tokio::spawn(run_informer(
            feed,
            writer,
            queue.clone(),
            informer_token.clone(),
        ));

        info!(namespace = %namespace, "Waiting for cache to sync");
        let synced = tokio::select! {
            synced = store.wait_until_synced(config.cache_sync_timeout) => synced,
            () = shutdown.cancelled() => {
                info!(namespace = %namespace, "Shutdown requested before cache sync");
                queue.shut_down();
                return join(informer).await;
            }
        };
        if !synced {
            error!(
                namespace = %namespace,
                "Timed out after {:?} waiting for cache to sync",
                config.cache_sync_timeout
            );
            informer_token.cancel();
            queue.shut_down();
            join(informer).await?;
            return Err(RunError::CacheSyncTimeout(config.cache_sync_timeout));
        }

        info!(namespace = %namespace, workers = config.workers, "Cache synced, starting workers");
        let workers: Vec<JoinHandle<()>> = (0..config.workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    queue.clone(),
                    store.clone(),
                    Arc::clone(&reconciler),
                    config.max_retries,
                );
                tokio::spawn(worker.run())
            })
            .collect();

        shutdown.cancelled().await;
        info!(namespace = %namespace, "Shutting down controller");
        informer_token.cancel();
        queue.shut_down();

        let mut result = join(informer).await;
        for handle in workers {
            let joined = join(handle).await;
            if result.is_ok() {
                result = joined;
            }
        }
        result
    }
}

async fn join(handle: JoinHandle<()>) -> Result<(), RunError> {
    handle
        .await
        .map_err(|e| RunError::TaskPanicked(e.to_string()))
}

/// Moves feed events into the cache and queues every touched key
async fn run_informer<K, C>(
    mut feed: ChangeFeed<K, C>,
    mut writer: Writer<K>,
    queue: WorkQueue<ResourceKey>,
    shutdown: CancellationToken,
) where
    K: Resource + Clone + Send + Sync + 'static,
    C: ResourceClient<K> + ?Sized,
{
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = feed.next() => event,
        };
        match event {
            FeedEvent::Init => debug!("Relist started"),
            FeedEvent::Change(change) => {
                writer.apply(&change);
                queue.add(change.key);
            }
            FeedEvent::InitDone { keys } => {
                debug!(count = keys.len(), "Relist finished");
                for key in writer.replace_finished(&keys) {
                    debug!("Pruned {} from cache", key);
                    queue.add(key);
                }
            }
        }
    }
    debug!("Informer stopped");
}
