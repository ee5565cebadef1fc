//! Cache abstraction, configuration and decorator assembly

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::decorator::{LoggingCache, SerializedCache, SynchronizedCache};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::metrics::{CacheMetrics, CacheStats};
use crate::storage::PerpetualCache;
use crate::strategy::{FifoCache, LruCache, ScheduledCache};

/// Cached result payload: result rows as a JSON array, or an update count
pub type CacheValue = Arc<Value>;

/// Shared statement cache.
///
/// Implementations use interior mutability and are shared as
/// `Arc<dyn Cache>` across sessions. `read_write_lock` exposes one lock per
/// cache stack: readers of the stack take it shared, writers exclusive.
pub trait Cache: Send + Sync {
    fn id(&self) -> &str;

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()>;

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>>;

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>>;

    fn clear(&self);

    fn size(&self) -> usize;

    fn read_write_lock(&self) -> &RwLock<()>;

    /// Apply a transaction's buffered writes: an optional clear followed by
    /// every pending put. The locking decorator runs this under one write lock.
    fn commit_batch(&self, clear: bool, entries: Vec<(CacheKey, CacheValue)>) -> Result<()> {
        if clear {
            self.clear();
        }
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Hit/miss statistics, when a decorator in the stack records them
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}

impl fmt::Debug for dyn Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.id())
            .field("size", &self.size())
            .finish()
    }
}

/// Capacity-bounded eviction order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    #[serde(alias = "LRU")]
    Lru,
    /// First in, first out
    #[serde(alias = "FIFO")]
    Fifo,
}

/// Default bound on the number of cached statements per namespace
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Per-namespace cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub eviction: EvictionPolicy,
    /// Maximum number of entries
    pub size: usize,
    /// Clear the whole cache once this much time has passed since the last
    /// clear (milliseconds)
    pub flush_interval_ms: Option<u64>,
    /// Hand out independent copies of cached values
    pub read_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::Lru,
            size: DEFAULT_CACHE_SIZE,
            flush_interval_ms: None,
            read_write: true,
        }
    }
}

impl CacheConfig {
    /// A builder for cache `id` carrying these settings
    pub fn builder(&self, id: impl Into<String>) -> CacheBuilder {
        CacheBuilder::new(id)
            .eviction(self.eviction)
            .size(self.size)
            .clear_interval(self.flush_interval_ms.map(Duration::from_millis))
            .read_write(self.read_write)
    }
}

/// Assembles a decorated cache stack.
///
/// Decorators are applied in this order: base store, eviction, scheduled
/// clear, serialized copies, logging, locking. A custom implementation only
/// receives logging and locking.
pub struct CacheBuilder {
    id: String,
    implementation: Option<Arc<dyn Cache>>,
    eviction: EvictionPolicy,
    size: usize,
    clear_interval: Option<Duration>,
    read_write: bool,
}

impl CacheBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            eviction: EvictionPolicy::Lru,
            size: DEFAULT_CACHE_SIZE,
            clear_interval: None,
            read_write: true,
        }
    }

    /// Use a custom store instead of the built-in stack
    pub fn implementation(mut self, cache: Arc<dyn Cache>) -> Self {
        self.implementation = Some(cache);
        self
    }

    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn clear_interval(mut self, interval: Option<Duration>) -> Self {
        self.clear_interval = interval;
        self
    }

    pub fn read_write(mut self, read_write: bool) -> Self {
        self.read_write = read_write;
        self
    }

    pub fn build(self) -> Result<Arc<dyn Cache>> {
        let invalid = |message: &str| CacheError::InvalidConfig {
            cache: self.id.clone(),
            message: message.to_string(),
        };
        let metrics = CacheMetrics::new();

        let core: Arc<dyn Cache> = match self.implementation.clone() {
            Some(custom) => {
                if custom.id() != self.id {
                    return Err(invalid(&format!(
                        "custom implementation reports id '{}'",
                        custom.id()
                    )));
                }
                custom
            }
            None => {
                let capacity = NonZeroUsize::new(self.size)
                    .ok_or_else(|| invalid("size must be greater than zero"))?;
                let base: Arc<dyn Cache> = Arc::new(PerpetualCache::new(self.id.clone()));
                let mut cache: Arc<dyn Cache> = match self.eviction {
                    EvictionPolicy::Lru => {
                        Arc::new(LruCache::new(base, capacity).with_metrics(metrics.clone()))
                    }
                    EvictionPolicy::Fifo => {
                        Arc::new(FifoCache::new(base, capacity).with_metrics(metrics.clone()))
                    }
                };
                if let Some(interval) = self.clear_interval {
                    if interval.is_zero() {
                        return Err(invalid("flush interval must be greater than zero"));
                    }
                    cache = Arc::new(ScheduledCache::new(cache, interval));
                }
                if self.read_write {
                    cache = Arc::new(SerializedCache::new(cache));
                }
                cache
            }
        };

        let logged: Arc<dyn Cache> = Arc::new(LoggingCache::with_metrics(core, metrics));
        debug!(
            cache = %self.id,
            eviction = ?self.eviction,
            size = self.size,
            read_write = self.read_write,
            custom = self.implementation.is_some(),
            "built cache"
        );
        Ok(Arc::new(SynchronizedCache::new(logged)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(n: i64) -> CacheKey {
        CacheKey::from_components([n])
    }

    #[test]
    fn test_default_stack_is_lru_1024() {
        let config = CacheConfig::default();
        assert_eq!(config.eviction, EvictionPolicy::Lru);
        assert_eq!(config.size, 1024);

        let cache = config.builder("blog").build().unwrap();
        assert_eq!(cache.id(), "blog");
        cache.put(key(1), Arc::new(json!([1]))).unwrap();
        assert_eq!(cache.get(&key(1)).unwrap().as_deref(), Some(&json!([1])));
        assert_eq!(cache.stats().map(|s| s.hits), Some(1));
    }

    #[test]
    fn test_builder_applies_eviction() {
        let cache = CacheBuilder::new("c").size(2).read_write(false).build().unwrap();
        cache.put(key(1), Arc::new(json!(1))).unwrap();
        cache.put(key(2), Arc::new(json!(2))).unwrap();
        cache.get(&key(1)).unwrap();
        cache.put(key(3), Arc::new(json!(3))).unwrap();

        assert!(cache.get(&key(2)).unwrap().is_none());
        assert!(cache.get(&key(1)).unwrap().is_some());
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.stats().map(|s| s.evictions), Some(1));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            CacheBuilder::new("c").size(0).build(),
            Err(CacheError::InvalidConfig { .. })
        ));
        assert!(CacheBuilder::new("c")
            .clear_interval(Some(Duration::ZERO))
            .build()
            .is_err());
        let custom: Arc<dyn Cache> = Arc::new(PerpetualCache::new("other"));
        assert!(CacheBuilder::new("c").implementation(custom).build().is_err());
    }

    #[test]
    fn test_custom_implementation_is_wrapped() {
        let custom: Arc<dyn Cache> = Arc::new(PerpetualCache::new("c"));
        let cache = CacheBuilder::new("c")
            .implementation(Arc::clone(&custom))
            .size(1)
            .build()
            .unwrap();
        cache.put(key(1), Arc::new(json!(1))).unwrap();
        cache.put(key(2), Arc::new(json!(2))).unwrap();
        // no eviction decorator on custom stores
        assert_eq!(custom.size(), 2);
        assert!(cache.stats().is_some());
    }

    #[test]
    fn test_config_from_toml() {
        let config: CacheConfig = toml::from_str(
            r#"
            eviction = "fifo"
            size = 16
            flush_interval_ms = 60000
            "#,
        )
        .unwrap();
        assert_eq!(config.eviction, EvictionPolicy::Fifo);
        assert_eq!(config.size, 16);
        assert_eq!(config.flush_interval_ms, Some(60_000));
        assert!(config.read_write);
    }
}
