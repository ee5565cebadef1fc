//! Base cache store

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cache::{Cache, CacheValue};
use crate::error::Result;
use crate::key::CacheKey;

/// Unbounded in-memory store. Owns the read/write lock handle that every
/// decorator stacked on top of it forwards.
#[derive(Debug)]
pub struct PerpetualCache {
    id: String,
    entries: RwLock<HashMap<CacheKey, CacheValue>>,
    lock: RwLock<()>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
            lock: RwLock::new(()),
        }
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        Ok(self.entries.write().remove(key))
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn size(&self) -> usize {
        self.entries.read().len()
    }

    fn read_write_lock(&self) -> &RwLock<()> {
        &self.lock
    }
}
