//! Per-key debouncing with cancellable timers.
//!
//! Each key owns at most one pending timer. Scheduling a key that already
//! has one aborts the old task and starts a new one, so a burst of changes
//! collapses into a single callback `delay` after the last of them.
//!
//! A generation number guards against the race where an aborted task has
//! already woken up: a timer only fires the callback if its generation is
//! still the one recorded for the key.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use hr_core::FxHashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Callback invoked when a key's timer fires uninterrupted.
pub type DebounceCallback<K> = Arc<dyn Fn(K) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

struct State<K> {
    pending: FxHashMap<K, Pending>,
    next_generation: u64,
}

/// Replace-don't-queue timers keyed by `K`.
///
/// Must be used from within a tokio runtime. Dropping the debouncer aborts
/// every pending timer.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// use futures_util::FutureExt;
/// use hr_watcher::Debouncer;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fired = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&fired);
/// let debouncer = Debouncer::new(Duration::from_millis(10), move |_key: &'static str| {
///     let counter = Arc::clone(&counter);
///     async move {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }
///     .boxed()
/// });
///
/// debouncer.schedule("cogs.ping");
/// debouncer.schedule("cogs.ping");
/// tokio::time::sleep(Duration::from_millis(50)).await;
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// # }
/// ```
pub struct Debouncer<K> {
    delay: Duration,
    state: Arc<Mutex<State<K>>>,
    callback: DebounceCallback<K>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a debouncer that calls `callback` `delay` after the last
    /// [`schedule`](Self::schedule) of a key.
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn(K) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            delay,
            state: Arc::new(Mutex::new(State {
                pending: FxHashMap::default(),
                next_generation: 0,
            })),
            callback: Arc::new(callback),
        }
    }

    /// Returns the debounce delay.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Starts (or restarts) the timer for `key`.
    ///
    /// Returns `true` if a pending timer was superseded.
    pub fn schedule(&self, key: K) -> bool {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;

        let superseded = match state.pending.remove(&key) {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        };

        let shared = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let current = {
                let mut state = shared.lock();
                let is_current = state
                    .pending
                    .get(&task_key)
                    .is_some_and(|pending| pending.generation == generation);
                if is_current {
                    state.pending.remove(&task_key);
                }
                is_current
            };

            if current {
                tracing::debug!(key = ?task_key, "debounce timer fired");
                callback(task_key).await;
            } else {
                tracing::trace!(key = ?task_key, generation, "stale debounce timer ignored");
            }
        });

        state.pending.insert(key, Pending { generation, handle });
        tracing::trace!(generation, superseded, "debounce timer scheduled");
        superseded
    }

    /// Cancels the pending timer for `key`. Returns `true` if one existed.
    pub fn cancel(&self, key: &K) -> bool {
        match self.state.lock().pending.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer and returns how many there were.
    ///
    /// Callbacks that already started are not interrupted.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Pending> = {
            let mut state = self.state.lock();
            state.pending.drain().map(|(_, pending)| pending).collect()
        };
        for pending in &drained {
            pending.handle.abort();
        }
        drained.len()
    }

    /// Returns `true` if `key` has a timer running.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.state.lock().pending.contains_key(key)
    }

    /// Returns the keys with a timer running.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<K> {
        self.state.lock().pending.keys().cloned().collect()
    }

    /// Number of timers running.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, pending) in self.state.lock().pending.drain() {
            pending.handle.abort();
        }
    }
}

impl<K> fmt::Debug for Debouncer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.state.lock().pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;
    use tokio::time::Instant;

    use super::*;

    type Fired = Arc<Mutex<Vec<(&'static str, Instant)>>>;

    fn recording(delay: Duration) -> (Debouncer<&'static str>, Fired) {
        let fired: Fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let debouncer = Debouncer::new(delay, move |key| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push((key, Instant::now()));
            }
            .boxed()
        });
        (debouncer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_call_after_last_save() {
        let (debouncer, fired) = recording(Duration::from_millis(500));
        let start = Instant::now();

        assert!(!debouncer.schedule("x"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(debouncer.schedule("x"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(debouncer.schedule("x"));

        tokio::time::sleep(Duration::from_secs(2)).await;

        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        let elapsed = fired[0].1 - start;
        assert!(
            elapsed >= Duration::from_millis(700) && elapsed < Duration::from_millis(710),
            "fired after {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let (debouncer, fired) = recording(Duration::from_millis(100));

        debouncer.schedule("a");
        debouncer.schedule("b");
        assert_eq!(debouncer.pending_count(), 2);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut keys: Vec<_> = fired.lock().iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (debouncer, fired) = recording(Duration::from_millis(100));

        debouncer.schedule("a");
        assert!(debouncer.is_pending(&"a"));
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (debouncer, fired) = recording(Duration::from_millis(100));

        debouncer.schedule("a");
        debouncer.schedule("b");
        let mut keys = debouncer.pending_keys();
        keys.sort_unstable();
        assert_eq!(keys, ["a", "b"]);

        assert_eq!(debouncer.cancel_all(), 2);
        assert_eq!(debouncer.cancel_all(), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_after_fire_runs_again() {
        let (debouncer, fired) = recording(Duration::from_millis(50));

        debouncer.schedule("a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.schedule("a");
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fired.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_pending() {
        let (debouncer, fired) = recording(Duration::from_millis(50));
        debouncer.schedule("a");
        drop(debouncer);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(fired.lock().is_empty());
    }
}
