//! Deduplicating, rate-limited work queue
//!
//! An item is held at most once in the ready queue. While a worker has an item
//! in flight, re-adding it only marks it dirty; `done` puts it back so a key is
//! never processed by two workers at the same time. Delayed adds go through a
//! background timer task that keeps only the earliest deadline per item.

use super::rate_limiter::ItemExponentialRateLimiter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::debug;

struct QueueState<T> {
    /// Ready items in FIFO order
    queue: VecDeque<T>,
    /// Items that need processing: queued, or re-added while in flight
    dirty: HashSet<T>,
    /// Items handed out by `get` and not yet `done`
    processing: HashSet<T>,
    shutting_down: bool,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    limiter: ItemExponentialRateLimiter<T>,
    delay_tx: mpsc::UnboundedSender<(T, Duration)>,
    shutdown: CancellationToken,
}

/// Cloneable handle to a work queue shared by the informer and the workers
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkQueue")
            .field("len", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}

impl<T> WorkQueue<T>
where
    T: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create a queue and start its delay timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(limiter: ItemExponentialRateLimiter<T>) -> Self {
        let (delay_tx, delay_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            limiter,
            delay_tx,
            shutdown: shutdown.clone(),
        });
        tokio::spawn(run_delay_loop(Arc::downgrade(&shared), delay_rx, shutdown));
        Self { shared }
    }

    /// Mark `item` as needing processing
    pub fn add(&self, item: T) {
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down || state.dirty.contains(&item) {
                return;
            }
            state.dirty.insert(item.clone());
            if state.processing.contains(&item) {
                return;
            }
            state.queue.push_back(item);
        }
        self.shared.notify.notify_one();
    }

    /// Wait for the next item and mark it in flight.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    if !state.queue.is_empty() {
                        self.shared.notify.notify_one();
                    }
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Finish processing `item`, requeueing it if it was added meanwhile
    pub fn done(&self, item: &T) {
        {
            let mut state = self.shared.state.lock();
            state.processing.remove(item);
            if !state.dirty.contains(item) || state.shutting_down {
                return;
            }
            state.queue.push_back(item.clone());
        }
        self.shared.notify.notify_one();
    }

    /// Add `item` once `delay` has elapsed
    pub fn add_after(&self, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let _ = self.shared.delay_tx.send((item, delay));
    }

    /// Add `item` after its per-item backoff delay
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.shared.limiter.when(&item);
        self.add_after(item, delay);
    }

    /// Stop tracking failures for `item`
    pub fn forget(&self, item: &T) {
        self.shared.limiter.forget(item);
    }

    /// Times `item` has been requeued through `add_rate_limited`
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.shared.limiter.num_requeues(item)
    }

    /// Number of items ready to be handed out
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// True if no item is ready
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and release every waiting `get`
    pub fn shut_down(&self) {
        self.shared.state.lock().shutting_down = true;
        self.shared.shutdown.cancel();
        self.shared.notify.notify_waiters();
    }

    /// True once `shut_down` has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }
}

/// Holds delayed items until their deadline, then adds them to the queue
async fn run_delay_loop<T>(
    shared: Weak<Shared<T>>,
    mut rx: mpsc::UnboundedReceiver<(T, Duration)>,
    shutdown: CancellationToken,
) where
    T: Eq + Hash + Clone + Send + Sync + 'static,
{
    let mut delayed: DelayQueue<T> = DelayQueue::new();
    let mut deadlines: HashMap<T, (delay_queue::Key, Instant)> = HashMap::new();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            request = rx.recv() => {
                let Some((item, delay)) = request else { break };
                let deadline = Instant::now() + delay;
                if let Some((key, at)) = deadlines.get_mut(&item) {
                    if deadline < *at {
                        delayed.reset_at(key, deadline);
                        *at = deadline;
                    }
                } else {
                    let key = delayed.insert_at(item.clone(), deadline);
                    deadlines.insert(item, (key, deadline));
                }
            }
            Some(expired) = std::future::poll_fn(|cx| delayed.poll_expired(cx)), if !delayed.is_empty() => {
                let item = expired.into_inner();
                deadlines.remove(&item);
                let Some(shared) = shared.upgrade() else { break };
                WorkQueue { shared }.add(item);
            }
        }
    }
    debug!("Work queue delay loop stopped");
}
