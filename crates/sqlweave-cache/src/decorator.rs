//! Copy, logging and locking decorators

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::cache::{Cache, CacheValue};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::metrics::{CacheMetrics, CacheStats, OperationTimer};

/// Stores a serialized snapshot of every value and hands out a freshly
/// deserialized copy on each lookup, so callers never share a cached value.
pub struct SerializedCache {
    delegate: Arc<dyn Cache>,
}

impl SerializedCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self { delegate }
    }

    fn serialization_error(&self, message: impl Into<String>) -> CacheError {
        CacheError::Serialization {
            cache: self.id().to_string(),
            message: message.into(),
        }
    }
}

impl Cache for SerializedCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        let snapshot = serde_json::to_string(value.as_ref())?;
        self.delegate.put(key, Arc::new(Value::String(snapshot)))
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        match self.delegate.get(key)? {
            None => Ok(None),
            Some(stored) => match stored.as_ref() {
                Value::String(snapshot) => {
                    let copy: Value = serde_json::from_str(snapshot)?;
                    Ok(Some(Arc::new(copy)))
                }
                _ => Err(self.serialization_error("stored entry is not a serialized snapshot")),
            },
        }
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.delegate.remove(key)
    }

    fn clear(&self) {
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

/// Records hit/miss statistics and logs the hit ratio on every lookup
pub struct LoggingCache {
    delegate: Arc<dyn Cache>,
    metrics: CacheMetrics,
}

impl LoggingCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self::with_metrics(delegate, CacheMetrics::new())
    }

    pub fn with_metrics(delegate: Arc<dyn Cache>, metrics: CacheMetrics) -> Self {
        Self { delegate, metrics }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.metrics.record_put();
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let timer = OperationTimer::start();
        let found = self.delegate.get(key)?;
        self.metrics.record_lookup(found.is_some(), &timer);
        debug!(
            cache = %self.id(),
            hit = found.is_some(),
            "Cache Hit Ratio [{}]: {}",
            self.id(),
            self.metrics.snapshot().hit_ratio()
        );
        Ok(found)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.metrics.record_clear();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn read_write_lock(&self) -> &RwLock<()> {
        self.delegate.read_write_lock()
    }

    fn commit_batch(&self, clear: bool, entries: Vec<(CacheKey, CacheValue)>) -> Result<()> {
        if clear {
            self.metrics.record_clear();
        }
        for _ in &entries {
            self.metrics.record_put();
        }
        self.delegate.commit_batch(clear, entries)
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.metrics.snapshot())
    }
}

/// Outermost decorator: lookups take the stack's lock shared, mutations and
/// batch commits take it exclusive.
///
/// Shared acquisitions are recursive so a caller already holding the read
/// lock around a lookup cannot deadlock against a queued writer.
pub struct SynchronizedCache {
    delegate: Arc<dyn Cache>,
}

impl SynchronizedCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self { delegate }
    }
}

impl Cache for SynchronizedCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        let _guard = self.delegate.read_write_lock().write();
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let _guard = self.delegate.read_write_lock().read_recursive();
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let _guard = self.delegate.read_write_lock().write();
        self.delegate.remove(key)
    }

    fn clear(&self) {
        let _guard = self.delegate.read_write_lock().write();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        let _guard = self.delegate.read_write_lock().read_recursive();
        self.delegate.size()
    }

    fn read_write_lock(&self) -> &RwLock<()> {
        self.delegate.read_write_lock()
    }

    fn commit_batch(&self, clear: bool, entries: Vec<(CacheKey, CacheValue)>) -> Result<()> {
        let _guard = self.delegate.read_write_lock().write();
        self.delegate.commit_batch(clear, entries)
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::storage::PerpetualCache;

    fn key(n: i64) -> CacheKey {
        CacheKey::from_components([n])
    }

    #[test]
    fn test_serialized_returns_independent_copies() {
        let base: Arc<dyn Cache> = Arc::new(PerpetualCache::new("s"));
        let cache = SerializedCache::new(Arc::clone(&base));
        let rows = Arc::new(json!([{"id": 1, "name": "ann"}]));
        cache.put(key(1), Arc::clone(&rows)).unwrap();

        let first = cache.get(&key(1)).unwrap().unwrap();
        let second = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(first, rows);
        assert!(!Arc::ptr_eq(&first, &rows));
        assert!(!Arc::ptr_eq(&first, &second));

        let stored = base.get(&key(1)).unwrap().unwrap();
        assert!(stored.is_string());
    }

    #[test]
    fn test_serialized_rejects_foreign_entries() {
        let base: Arc<dyn Cache> = Arc::new(PerpetualCache::new("s"));
        base.put(key(1), Arc::new(json!(7))).unwrap();
        let cache = SerializedCache::new(base);
        assert!(matches!(
            cache.get(&key(1)),
            Err(CacheError::Serialization { .. })
        ));
    }

    #[test]
    fn test_serialized_reports_corrupt_snapshots() {
        let base: Arc<dyn Cache> = Arc::new(PerpetualCache::new("s"));
        base.put(key(1), Arc::new(json!("{\"id\": "))).unwrap();
        let cache = SerializedCache::new(base);
        let err = cache.get(&key(1)).unwrap_err();
        assert!(matches!(err, CacheError::Json(_)));
        assert!(err.to_string().starts_with("JSON serialization error"));
    }

    #[test]
    fn test_logging_counts_hits_and_misses() {
        let cache = LoggingCache::new(Arc::new(PerpetualCache::new("l")));
        cache.put(key(1), Arc::new(json!(1))).unwrap();
        cache.get(&key(1)).unwrap();
        cache.get(&key(2)).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn test_readers_share_lock_writer_excludes() {
        let cache: Arc<dyn Cache> =
            Arc::new(SynchronizedCache::new(Arc::new(PerpetualCache::new("sync"))));
        cache.put(key(1), Arc::new(json!(1))).unwrap();

        let read = cache.read_write_lock().read();
        // another reader gets in while the read lock is held
        assert!(cache.read_write_lock().try_read().is_some());
        assert!(cache.get(&key(1)).unwrap().is_some());

        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.put(key(2), Arc::new(json!(2))))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(cache.read_write_lock().try_write().is_none());
        drop(read);

        writer.join().unwrap().unwrap();
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn test_batch_commit_under_write_lock() {
        let cache = SynchronizedCache::new(Arc::new(PerpetualCache::new("sync")));
        cache.put(key(1), Arc::new(json!("stale"))).unwrap();
        cache
            .commit_batch(
                true,
                vec![(key(2), Arc::new(json!(2))), (key(3), Arc::new(json!(3)))],
            )
            .unwrap();
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert_eq!(cache.size(), 2);
    }
}
