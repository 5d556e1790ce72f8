//! Hit/miss/write/delete counters

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local operation counters
///
/// Counters are per cache handle and are not shared between processes.
/// Nothing is recorded while statistics are disabled.
#[derive(Debug)]
pub(crate) struct StatsTracker {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    since: Mutex<DateTime<Utc>>,
}

impl StatsTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            since: Mutex::new(Utc::now()),
        }
    }

    #[inline]
    fn bump(&self, counter: &AtomicU64, by: u64) {
        if self.enabled {
            counter.fetch_add(by, Ordering::Relaxed);
        }
    }

    pub fn hit(&self) {
        self.bump(&self.hits, 1);
    }

    pub fn miss(&self) {
        self.bump(&self.misses, 1);
    }

    /// Record a lookup outcome
    pub fn lookup(&self, found: bool) {
        if found {
            self.hit();
        } else {
            self.miss();
        }
    }

    pub fn write(&self) {
        self.bump(&self.writes, 1);
    }

    pub fn delete(&self, count: u64) {
        self.bump(&self.deletes, count);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        *self.since.lock() = Utc::now();
    }

    /// Counter values combined with enumerated totals
    pub fn snapshot(&self, item_count: u64, size: u64) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStatistics {
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            item_count,
            size,
            stats_since: *self.since.lock(),
        }
    }
}

/// Statistics reported by [`FileCache::get_stats`](crate::FileCache::get_stats)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    /// `hits / (hits + misses)`, 0 before any lookup
    pub hit_rate: f64,
    /// Live entries on disk
    pub item_count: u64,
    /// Sum of live entries' payload sizes in bytes
    pub size: u64,
    pub stats_since: DateTime<Utc>,
}
