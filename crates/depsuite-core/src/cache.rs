//! Debounced memoization cache.
//!
//! Owned by one build session. Each key holds a shared future, so concurrent
//! lookups of an identical key collapse into one in-flight operation. Every
//! access re-arms that key's expiry; a key untouched for a full window is
//! evicted on the next access to the cache (or an explicit [`sweep`]).
//!
//! [`sweep`]: DebouncedCache::sweep

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// A memoized value that may still be computing.
pub type SharedValue<V> = Shared<BoxFuture<'static, V>>;

struct Slot<V> {
    value: SharedValue<V>,
    expires_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

/// Per-session memoization with a per-key debounce window.
pub struct DebouncedCache<K, V> {
    window: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
}

impl<K, V> fmt::Debug for DebouncedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("DebouncedCache")
            .field("window", &self.window)
            .field("len", &len)
            .finish()
    }
}

impl<K, V> DebouncedCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            evictions: AtomicUsize::new(0),
        }
    }

    /// The debounce window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Return the memoized value for `key`, starting `make` only on a miss.
    ///
    /// The returned future is shared: awaiting it from several tasks runs the
    /// underlying work once.
    pub fn get_or_insert_with<F, Fut>(&self, key: K, make: F) -> SharedValue<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut slots, now);

        if let Some(slot) = slots.get_mut(&key) {
            slot.expires_at = now + self.window;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return slot.value.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = make().boxed().shared();
        slots.insert(
            key,
            Slot {
                value: value.clone(),
                expires_at: now + self.window,
            },
        );
        value
    }

    /// Whether `key` is currently memoized (does not re-arm its window).
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(key)
            .is_some_and(|slot| slot.expires_at > Instant::now())
    }

    /// Evict every key whose window has lapsed. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut slots, Instant::now())
    }

    /// Drop a single key.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key).is_some()
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            entry_count: slots.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_expired(&self, slots: &mut HashMap<K, Slot<V>>, now: Instant) -> usize {
        let before = slots.len();
        slots.retain(|key, slot| {
            let keep = slot.expires_at > now;
            if !keep {
                trace!(?key, "debounce window lapsed, evicting");
            }
            keep
        });
        let evicted = before - slots.len();
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        evicted
    }
}
