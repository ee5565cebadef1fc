//! # sqlweave cache
//!
//! Second-level statement cache for sqlweave.
//!
//! ## Features
//!
//! - **Fingerprints**: order-sensitive [`CacheKey`]s with exact equality
//! - **Decorators**: LRU/FIFO eviction, scheduled clear, serialized copies,
//!   hit-ratio logging, read/write locking
//! - **Transactions**: per-session write buffers committed or discarded at
//!   the transaction boundary

pub mod cache;
pub mod decorator;
pub mod error;
pub mod key;
pub mod metrics;
pub mod storage;
pub mod strategy;
pub mod transactional;

pub use cache::{Cache, CacheBuilder, CacheConfig, CacheValue, EvictionPolicy, DEFAULT_CACHE_SIZE};
pub use decorator::{LoggingCache, SerializedCache, SynchronizedCache};
pub use error::{CacheError, Result};
pub use key::CacheKey;
pub use metrics::{CacheMetrics, CacheStats, OperationTimer};
pub use storage::PerpetualCache;
pub use strategy::{FifoCache, LruCache, ScheduledCache};
pub use transactional::{TransactionalCache, TransactionalCacheManager};
