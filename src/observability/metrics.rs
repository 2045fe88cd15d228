use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking governor activity.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total decision requests processed
    pub decisions_total: AtomicU64,
    pub decisions_allowed: AtomicU64,
    pub decisions_denied: AtomicU64,

    /// Rulepack cache behaviour
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    /// Control-plane fetches
    pub fetches_total: AtomicU64,
    pub fetch_errors: AtomicU64,

    /// Audit persistence
    pub audit_writes_total: AtomicU64,
    pub audit_write_errors: AtomicU64,

    /// Offline replay queue
    pub queue_accepted: AtomicU64,
    pub queue_rejected: AtomicU64,
    pub replays_total: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a decision outcome.
    pub fn record_decision(&self, allowed: bool) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.decisions_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.decisions_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_fetch(&self, success: bool) {
        self.fetches_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.fetch_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audit_write(&self, success: bool) {
        self.audit_writes_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.audit_write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_queue(&self, accepted: bool) {
        if accepted {
            self.queue_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queue_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_replay(&self) {
        self.replays_total.fetch_add(1, Ordering::Relaxed);
    }
}
