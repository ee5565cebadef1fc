//! Second-level caching around a session executor
//!
//! Query results are written to a per-session [`TransactionalCacheManager`]
//! and only reach the shared namespace cache when the session commits. A
//! statement that flushes the cache marks the session dirty; until the next
//! commit or rollback, lookups bypass the shared cache so the session never
//! reads results its own pending writes may have invalidated.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlweave_cache::{Cache, CacheKey, CacheValue, TransactionalCacheManager};
use sqlweave_scripting::BoundSql;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::executor::Executor;
use crate::mapping::{MappedStatement, RowBounds};

const EXECUTOR_NAME: &str = "CachingExecutor";

/// Executor decorator adding the transactional second-level cache
pub struct CachingExecutor<E> {
    delegate: E,
    auto_commit: bool,
    tcm: TransactionalCacheManager,
    dirty: bool,
}

impl<E: Executor> CachingExecutor<E> {
    pub fn new(delegate: E, auto_commit: bool) -> Self {
        Self {
            delegate,
            auto_commit,
            tcm: TransactionalCacheManager::new(),
            dirty: false,
        }
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut E {
        &mut self.delegate
    }

    /// Whether a flushing statement ran since the last commit or rollback
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_pending_cache_writes(&self) -> bool {
        self.tcm.has_pending()
    }

    fn flush_cache_if_required(&mut self, ms: &MappedStatement) {
        if let Some(cache) = ms.cache() {
            if ms.is_flush_cache_required() {
                debug!(statement = %ms.id(), cache = %cache.id(), "flushing cache");
                self.dirty = true;
                self.tcm.clear(cache);
            }
        }
    }

    /// Look up under the stack's shared lock. Synchronous so the guard never
    /// lives across an await point.
    fn lookup(&self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Result<Option<CacheValue>> {
        let _guard = cache.read_write_lock().read_recursive();
        Ok(self.tcm.get_object(cache, key)?)
    }
}

fn ensure_no_out_params(ms: &MappedStatement, bound: &BoundSql<'_>) -> Result<()> {
    if bound
        .parameter_mappings()
        .iter()
        .any(|mapping| !mapping.is_input_only())
    {
        return Err(SessionError::OutParamsNotCacheable {
            statement: ms.id().to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl<E: Executor> Executor for CachingExecutor<E> {
    async fn update(&mut self, ms: &MappedStatement, parameter: &Value) -> Result<u64> {
        self.flush_cache_if_required(ms);
        self.delegate.update(ms, parameter).await
    }

    async fn query_with_key(
        &mut self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        key: CacheKey,
        bound: &BoundSql<'_>,
    ) -> Result<CacheValue> {
        let Some(cache) = ms.cache() else {
            return self
                .delegate
                .query_with_key(ms, parameter, bounds, key, bound)
                .await;
        };

        self.flush_cache_if_required(ms);
        if !ms.is_use_cache() {
            return self
                .delegate
                .query_with_key(ms, parameter, bounds, key, bound)
                .await;
        }

        ensure_no_out_params(ms, bound)?;
        if !self.dirty {
            if let Some(hit) = self.lookup(cache, &key)? {
                trace!(statement = %ms.id(), cache = %cache.id(), "second-level cache hit");
                return Ok(hit);
            }
        }

        let result = self
            .delegate
            .query_with_key(ms, parameter, bounds, key.clone(), bound)
            .await?;
        self.tcm.put_object(cache, key, Arc::clone(&result));
        Ok(result)
    }

    async fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required).await?;
        self.tcm.commit()?;
        self.dirty = false;
        Ok(())
    }

    async fn rollback(&mut self, required: bool) -> Result<()> {
        let result = self.delegate.rollback(required).await;
        if result.is_ok() {
            self.dirty = false;
        }
        if required {
            self.tcm.rollback();
        }
        result
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql<'_>,
        bounds: RowBounds,
    ) -> Result<CacheKey> {
        self.delegate.create_cache_key(ms, bound, bounds)
    }

    fn is_cached(&self, _ms: &MappedStatement, _key: &CacheKey) -> Result<bool> {
        Err(SessionError::Unsupported {
            operation: "is_cached",
            executor: EXECUTOR_NAME,
        })
    }

    fn defer_load(&mut self, _ms: &MappedStatement, _property: &str, _key: &CacheKey) -> Result<()> {
        Err(SessionError::Unsupported {
            operation: "defer_load",
            executor: EXECUTOR_NAME,
        })
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    async fn close(&mut self, force_rollback: bool) -> Result<()> {
        let outcome = if self.dirty && !self.auto_commit {
            debug!("closing dirty session, discarding pending cache writes");
            self.tcm.rollback();
            Ok(())
        } else {
            self.tcm.commit().map_err(SessionError::from)
        };
        let closed = self.delegate.close(force_rollback).await;
        outcome.and(closed)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }
}
