//! Mapped statements and row bounds

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlweave_cache::Cache;
use sqlweave_scripting::{BoundSql, SqlSource};

use crate::error::Result;

/// Kind of SQL command a statement issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlCommandType {
    #[default]
    Unknown,
    Insert,
    Update,
    Delete,
    Select,
}

impl SqlCommandType {
    pub fn is_select(&self) -> bool {
        matches!(self, Self::Select)
    }
}

impl FromStr for SqlCommandType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown command type '{}'", other)),
        }
    }
}

impl fmt::Display for SqlCommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Select => "SELECT",
        };
        f.write_str(name)
    }
}

/// How the driver prepares a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    Statement,
    #[default]
    Prepared,
    Callable,
}

/// Paging window applied by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    pub offset: u64,
    pub limit: u64,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: u64 = 0;
    pub const NO_ROW_LIMIT: u64 = u64::MAX;

    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self {
            offset: Self::NO_ROW_OFFSET,
            limit: Self::NO_ROW_LIMIT,
        }
    }
}

/// A registered statement: its template source plus caching policy.
///
/// Selects use the namespace cache and leave it alone by default; every other
/// command flushes it.
#[derive(Debug)]
pub struct MappedStatement {
    id: String,
    sql_source: SqlSource,
    command_type: SqlCommandType,
    statement_type: StatementType,
    cache: Option<Arc<dyn Cache>>,
    flush_cache_required: bool,
    use_cache: bool,
    timeout: Option<u64>,
    database_id: Option<String>,
}

impl MappedStatement {
    pub fn builder(
        id: impl Into<String>,
        sql_source: SqlSource,
        command_type: SqlCommandType,
    ) -> MappedStatementBuilder {
        MappedStatementBuilder::new(id, sql_source, command_type)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sql_source(&self) -> &SqlSource {
        &self.sql_source
    }

    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    pub fn is_flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    pub fn is_use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn timeout(&self) -> Option<u64> {
        self.timeout
    }

    pub fn database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    /// Compose the SQL for one call
    pub fn bound_sql<'p>(&self, parameter: &'p Value) -> Result<BoundSql<'p>> {
        Ok(self.sql_source.bound_sql(parameter)?)
    }
}

/// Builder for [`MappedStatement`]
pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    pub fn new(id: impl Into<String>, sql_source: SqlSource, command_type: SqlCommandType) -> Self {
        let is_select = command_type.is_select();
        Self {
            statement: MappedStatement {
                id: id.into(),
                sql_source,
                command_type,
                statement_type: StatementType::default(),
                cache: None,
                flush_cache_required: !is_select,
                use_cache: is_select,
                timeout: None,
                database_id: None,
            },
        }
    }

    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement.statement_type = statement_type;
        self
    }

    pub fn cache(mut self, cache: Option<Arc<dyn Cache>>) -> Self {
        self.statement.cache = cache;
        self
    }

    pub fn flush_cache_required(mut self, flush: bool) -> Self {
        self.statement.flush_cache_required = flush;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    pub fn timeout(mut self, timeout: Option<u64>) -> Self {
        self.statement.timeout = timeout;
        self
    }

    pub fn database_id(mut self, database_id: Option<String>) -> Self {
        self.statement.database_id = database_id;
        self
    }

    pub fn build(self) -> MappedStatement {
        self.statement
    }
}
