//! Eviction and invalidation decorators
//!
//! These track key order or elapsed time on top of a delegate store and
//! remove entries from the delegate when their policy says so.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::cache::{Cache, CacheValue};
use crate::error::Result;
use crate::key::CacheKey;
use crate::metrics::{CacheMetrics, CacheStats};

/// Least-recently-used bound. Both insertion and lookup make a key the most
/// recently used one; inserting past capacity evicts the least recent key.
pub struct LruCache {
    delegate: Arc<dyn Cache>,
    keys: Mutex<lru::LruCache<CacheKey, ()>>,
    metrics: Option<CacheMetrics>,
}

impl LruCache {
    pub fn new(delegate: Arc<dyn Cache>, capacity: NonZeroUsize) -> Self {
        Self {
            delegate,
            keys: Mutex::new(lru::LruCache::new(capacity)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn capacity(&self) -> usize {
        self.keys.lock().cap().get()
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.delegate.put(key.clone(), value)?;
        let evicted = self.keys.lock().push(key.clone(), ());
        if let Some((eldest, ())) = evicted {
            if eldest != key {
                trace!(cache = %self.id(), key = %eldest, "evicting least recently used");
                self.delegate.remove(&eldest)?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_eviction();
                }
            }
        }
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.keys.lock().promote(key);
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.keys.lock().pop(key);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.keys.lock().clear();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn read_write_lock(&self) -> &RwLock<()> {
        self.delegate.read_write_lock()
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}

/// Insertion-order bound. Lookups do not affect eviction order.
pub struct FifoCache {
    delegate: Arc<dyn Cache>,
    keys: Mutex<VecDeque<CacheKey>>,
    capacity: NonZeroUsize,
    metrics: Option<CacheMetrics>,
}

impl FifoCache {
    pub fn new(delegate: Arc<dyn Cache>, capacity: NonZeroUsize) -> Self {
        Self {
            delegate,
            keys: Mutex::new(VecDeque::with_capacity(capacity.get())),
            capacity,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        let eldest = {
            let mut keys = self.keys.lock();
            if !keys.contains(&key) {
                keys.push_back(key.clone());
            }
            if keys.len() > self.capacity.get() {
                keys.pop_front()
            } else {
                None
            }
        };
        if let Some(eldest) = eldest {
            trace!(cache = %self.id(), key = %eldest, "evicting oldest entry");
            self.delegate.remove(&eldest)?;
            if let Some(metrics) = &self.metrics {
                metrics.record_eviction();
            }
        }
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.keys.lock().retain(|k| k != key);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.keys.lock().clear();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn read_write_lock(&self) -> &RwLock<()> {
        self.delegate.read_write_lock()
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}

/// Clears the delegate before an access once the flush interval has passed
/// since the last clear
pub struct ScheduledCache {
    delegate: Arc<dyn Cache>,
    clear_interval: Duration,
    last_clear: Mutex<Instant>,
}

impl ScheduledCache {
    pub fn new(delegate: Arc<dyn Cache>, clear_interval: Duration) -> Self {
        Self {
            delegate,
            clear_interval,
            last_clear: Mutex::new(Instant::now()),
        }
    }

    pub fn clear_interval(&self) -> Duration {
        self.clear_interval
    }

    fn clear_when_stale(&self) -> bool {
        let mut last_clear = self.last_clear.lock();
        if last_clear.elapsed() >= self.clear_interval {
            debug!(cache = %self.delegate.id(), "flush interval elapsed, clearing");
            self.delegate.clear();
            *last_clear = Instant::now();
            true
        } else {
            false
        }
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.clear_when_stale();
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        if self.clear_when_stale() {
            Ok(None)
        } else {
            self.delegate.get(key)
        }
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.clear_when_stale();
        self.delegate.remove(key)
    }

    fn clear(&self) {
        *self.last_clear.lock() = Instant::now();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.clear_when_stale();
        self.delegate.size()
    }

    fn read_write_lock(&self) -> &RwLock<()> {
        self.delegate.read_write_lock()
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}
