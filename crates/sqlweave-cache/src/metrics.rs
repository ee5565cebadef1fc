//! Cache hit/miss accounting

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    /// Entries dropped by a capacity bound
    pub evictions: u64,
    pub clears: u64,
    /// Average lookup time (milliseconds)
    pub avg_retrieval_time_ms: f64,
    pub created_at: DateTime<Utc>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            puts: 0,
            evictions: 0,
            clears: 0,
            avg_retrieval_time_ms: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Fraction of lookups that hit, between 0.0 and 1.0
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        self.hit_ratio() * 100.0
    }

    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            100.0 - self.hit_rate()
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe metrics tracker. Clones share the same counters, so one
/// tracker can be handed to several decorators of the same cache.
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    puts: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    clears: Arc<AtomicU64>,
    total_retrieval_time_us: Arc<AtomicU64>,
    created_at: DateTime<Utc>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            puts: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
            clears: Arc::new(AtomicU64::new(0)),
            total_retrieval_time_us: Arc::new(AtomicU64::new(0)),
            created_at: Utc::now(),
        }
    }

    /// Record a lookup and how long it took
    pub fn record_lookup(&self, hit: bool, timer: &OperationTimer) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.total_retrieval_time_us
            .fetch_add(timer.elapsed_us(), Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let total_us = self.total_retrieval_time_us.load(Ordering::Relaxed);

        CacheStats {
            hits,
            misses,
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            avg_retrieval_time_ms: if lookups > 0 {
                total_us as f64 / lookups as f64 / 1000.0
            } else {
                0.0
            },
            created_at: self.created_at,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.puts,
            &self.evictions,
            &self.clears,
            &self.total_retrieval_time_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "hits={} misses={} hit_ratio={:.2} puts={} evictions={} clears={}",
            stats.hits,
            stats.misses,
            stats.hit_ratio(),
            stats.puts,
            stats.evictions,
            stats.clears
        )
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation timing helper
#[derive(Debug)]
pub struct OperationTimer {
    start_time: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}
