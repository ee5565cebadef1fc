//! The statement execution seam
//!
//! An [`Executor`] talks to the database on behalf of one session. This crate
//! ships no driver; [`CachingExecutor`](crate::caching::CachingExecutor)
//! decorates whatever executor the application provides.

use async_trait::async_trait;
use serde_json::Value;
use sqlweave_cache::{CacheKey, CacheValue};
use sqlweave_scripting::{BoundSql, ParameterMode, ScriptError};

use crate::error::Result;
use crate::mapping::{MappedStatement, RowBounds};

/// Executes mapped statements for one session
#[async_trait]
pub trait Executor: Send {
    /// Run an insert, update or delete and return the affected row count
    async fn update(&mut self, ms: &MappedStatement, parameter: &Value) -> Result<u64>;

    /// Compose the statement, derive its fingerprint and run it
    async fn query(
        &mut self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<CacheValue> {
        let bound = ms.bound_sql(parameter)?;
        let key = self.create_cache_key(ms, &bound, bounds)?;
        self.query_with_key(ms, parameter, bounds, key, &bound).await
    }

    /// Run a query whose statement and fingerprint are already computed
    async fn query_with_key(
        &mut self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        key: CacheKey,
        bound: &BoundSql<'_>,
    ) -> Result<CacheValue>;

    async fn commit(&mut self, required: bool) -> Result<()>;

    async fn rollback(&mut self, required: bool) -> Result<()>;

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql<'_>,
        bounds: RowBounds,
    ) -> Result<CacheKey> {
        statement_cache_key(ms, bound, bounds)
    }

    fn is_cached(&self, ms: &MappedStatement, key: &CacheKey) -> Result<bool>;

    fn defer_load(&mut self, ms: &MappedStatement, property: &str, key: &CacheKey) -> Result<()>;

    fn clear_local_cache(&mut self);

    async fn close(&mut self, force_rollback: bool) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Fingerprint of one statement call: statement id, offset, limit, composed
/// SQL, then every non-OUT parameter value in marker order
pub fn statement_cache_key(
    ms: &MappedStatement,
    bound: &BoundSql<'_>,
    bounds: RowBounds,
) -> Result<CacheKey> {
    let mut key = CacheKey::new();
    key.update(ms.id());
    key.update(bounds.offset);
    key.update(bounds.limit);
    key.update(bound.sql());
    for mapping in bound.parameter_mappings() {
        if mapping.mode == ParameterMode::Out {
            continue;
        }
        let value = bound
            .parameter_value(mapping)
            .map_err(|source| ScriptError::Expression {
                expression: mapping.property.clone(),
                source,
            })?;
        key.update(value);
    }
    Ok(key)
}
