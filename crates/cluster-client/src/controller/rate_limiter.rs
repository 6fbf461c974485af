//! Per-item exponential rate limiter for requeues

use crate::backoff::ExponentialBackoff;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Default delay after the first failure
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
/// Default ceiling on a single requeue delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Tracks failures per item; each failure doubles that item's next delay
#[derive(Debug)]
pub struct ItemExponentialRateLimiter<T> {
    backoff: ExponentialBackoff,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T: Eq + Hash + Clone> ItemExponentialRateLimiter<T> {
    /// Create a limiter starting at `base` and capped at `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(base, max),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before `item` should be retried; records one more failure
    pub fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(item.clone()).or_insert(0);
        let delay = self.backoff.for_attempt(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Clear the failure history of `item`
    pub fn forget(&self, item: &T) {
        self.failures.lock().remove(item);
    }

    /// Number of times `item` has been rate limited since it was last forgotten
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}

impl<T: Eq + Hash + Clone> Default for ItemExponentialRateLimiter<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
