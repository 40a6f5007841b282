use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome counters for memoized guest calls.
#[derive(Debug, Default)]
pub struct MemoMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
}

impl MemoMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A call that never consulted the cache: memoization off, unsupported
    /// arity, or a null argument.
    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.bypasses.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MemoMetricsSnapshot {
        MemoMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub bypasses: u64,
}

impl MemoMetricsSnapshot {
    pub const fn calls(&self) -> u64 {
        self.hits + self.misses + self.bypasses
    }

    /// Guest invocations actually made.
    pub const fn guest_calls(&self) -> u64 {
        self.misses + self.bypasses
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
