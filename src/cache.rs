use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// A single cached value with its expiry deadline.
///
/// `expires_at` of `None` means the entry never expires.
struct CacheEntry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now > deadline,
            None => false,
        }
    }
}

type Clock = Box<dyn Fn() -> Instant + Send + Sync>;

/// Thread-safe TTL cache keyed by rulepack identifier.
///
/// Reads take the shared lock and never block each other. Expired entries are
/// evicted lazily: a read that finds a stale entry escalates to the exclusive
/// lock and re-checks before deleting, so a concurrent `set` racing the
/// eviction is never lost.
pub struct RuleCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    clock: Clock,
    ttl: Duration,
}

impl<T: Clone> RuleCache<T> {
    /// Create a cache with the supplied default TTL. A zero TTL means entries
    /// never expire.
    pub fn new(ttl: Duration) -> Self {
        RuleCache {
            entries: RwLock::new(HashMap::new()),
            clock: Box::new(Instant::now),
            ttl,
        }
    }

    /// Replace the time source. Used by tests to make expiry deterministic.
    pub fn with_clock(mut self, clock: impl Fn() -> Instant + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Return the cached value when it is still valid.
    ///
    /// A hit does not refresh the entry's TTL.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = (self.clock)();

        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // The entry was present but expired. Re-check under the write lock so
        // a value stored by a concurrent set is not deleted.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired((self.clock)()) {
                entries.remove(key);
            }
        }
        None
    }

    /// Store a value under the cache-wide default TTL.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Store a value with a per-entry TTL override. A zero TTL pins the entry
    /// forever.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some((self.clock)() + ttl)
        };
        let entry = CacheEntry { value, expires_at };
        self.entries.write().insert(key.into(), entry);
    }

    /// Remove an entry unconditionally.
    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Number of stored entries. Mainly used for metrics.
    ///
    /// Quirk: entries that have expired but have not yet been touched by a
    /// read are still counted, since eviction is lazy.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
