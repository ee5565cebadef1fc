//! Per-transaction write buffering
//!
//! A [`TransactionalCache`] belongs to one session. Puts and clears are kept
//! local until [`commit`](TransactionalCache::commit); other sessions keep
//! seeing the shared cache as it was.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{Cache, CacheValue};
use crate::error::Result;
use crate::key::CacheKey;

/// Pending writes against one shared cache
pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CacheValue>,
}

impl TransactionalCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Look up through to the shared cache unless a clear is pending
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        if self.clear_on_commit {
            return Ok(None);
        }
        self.delegate.get(key)
    }

    pub fn put(&mut self, key: CacheKey, value: CacheValue) {
        self.entries_to_add_on_commit.insert(key, value);
    }

    /// Schedule a clear of the shared cache and drop pending puts
    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
    }

    /// Apply the pending clear and puts to the shared cache
    pub fn commit(&mut self) -> Result<()> {
        let clear = std::mem::take(&mut self.clear_on_commit);
        let entries: Vec<_> = self.entries_to_add_on_commit.drain().collect();
        debug!(
            cache = %self.id(),
            clear,
            entries = entries.len(),
            "committing transactional cache"
        );
        self.delegate.commit_batch(clear, entries)
    }

    /// Discard pending state without touching the shared cache
    pub fn rollback(&mut self) {
        debug!(
            cache = %self.id(),
            discarded = self.entries_to_add_on_commit.len(),
            "rolling back transactional cache"
        );
        self.reset();
    }

    pub fn is_clear_pending(&self) -> bool {
        self.clear_on_commit
    }

    pub fn pending_puts(&self) -> usize {
        self.entries_to_add_on_commit.len()
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
    }
}

/// The transactional caches of one session, keyed by shared cache id
#[derive(Default)]
pub struct TransactionalCacheManager {
    transactional_caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.transactional_cache(cache).clear();
    }

    pub fn get_object(&self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Result<Option<CacheValue>> {
        match self.transactional_caches.get(cache.id()) {
            Some(txn) => txn.get(key),
            None => cache.get(key),
        }
    }

    pub fn put_object(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: CacheValue) {
        self.transactional_cache(cache).put(key, value);
    }

    /// Commit every transactional cache. All caches are committed even if one
    /// fails; the first failure is returned.
    pub fn commit(&mut self) -> Result<()> {
        let mut first_error = None;
        for txn in self.transactional_caches.values_mut() {
            if let Err(e) = txn.commit() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn rollback(&mut self) {
        for txn in self.transactional_caches.values_mut() {
            txn.rollback();
        }
    }

    /// Whether any cache has a pending clear or pending puts
    pub fn has_pending(&self) -> bool {
        self.transactional_caches
            .values()
            .any(|txn| txn.is_clear_pending() || txn.pending_puts() > 0)
    }

    fn transactional_cache(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.transactional_caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(Arc::clone(cache)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::CacheBuilder;

    fn shared() -> Arc<dyn Cache> {
        CacheBuilder::new("blog").build().unwrap()
    }

    fn key(n: i64) -> CacheKey {
        CacheKey::from_components([n])
    }

    #[test]
    fn test_put_then_rollback_leaves_shared_untouched() {
        let cache = shared();
        let mut txn = TransactionalCache::new(Arc::clone(&cache));
        txn.put(key(1), Arc::new(json!([1])));
        txn.rollback();
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert_eq!(txn.pending_puts(), 0);
    }

    #[test]
    fn test_put_then_commit_is_visible() {
        let cache = shared();
        let mut txn = TransactionalCache::new(Arc::clone(&cache));
        txn.put(key(1), Arc::new(json!([1])));
        assert!(cache.get(&key(1)).unwrap().is_none());

        txn.commit().unwrap();
        assert_eq!(cache.get(&key(1)).unwrap().as_deref(), Some(&json!([1])));
    }

    #[test]
    fn test_pending_clear_hides_shared_entries() {
        let cache = shared();
        cache.put(key(1), Arc::new(json!("old"))).unwrap();

        let mut txn = TransactionalCache::new(Arc::clone(&cache));
        txn.put(key(2), Arc::new(json!("dropped")));
        txn.clear();
        assert!(txn.get(&key(1)).unwrap().is_none());
        assert_eq!(txn.pending_puts(), 0);
        // still visible to everyone else
        assert!(cache.get(&key(1)).unwrap().is_some());

        txn.put(key(3), Arc::new(json!("new")));
        txn.commit().unwrap();
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.get(&key(2)).unwrap().is_none());
        assert!(cache.get(&key(3)).unwrap().is_some());
        assert!(!txn.is_clear_pending());
    }

    #[test]
    fn test_manager_routes_by_cache() {
        let blog = shared();
        let author: Arc<dyn Cache> = CacheBuilder::new("author").build().unwrap();
        let mut tcm = TransactionalCacheManager::new();

        tcm.put_object(&blog, key(1), Arc::new(json!(1)));
        tcm.put_object(&author, key(1), Arc::new(json!(2)));
        assert!(tcm.has_pending());
        assert!(tcm.get_object(&blog, &key(1)).unwrap().is_none());

        tcm.commit().unwrap();
        assert!(!tcm.has_pending());
        assert_eq!(tcm.get_object(&blog, &key(1)).unwrap().as_deref(), Some(&json!(1)));
        assert_eq!(author.get(&key(1)).unwrap().as_deref(), Some(&json!(2)));

        tcm.clear(&blog);
        assert!(tcm.get_object(&blog, &key(1)).unwrap().is_none());
        tcm.rollback();
        assert!(tcm.get_object(&blog, &key(1)).unwrap().is_some());
    }
}
