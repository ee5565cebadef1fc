//! SQL sources: composed-once versus per-call templates

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::context::DynamicContext;
use crate::error::{Result, ScriptError};
use crate::expression::{ExpressionEvaluator, DATABASE_ID_KEY, PARAMETER_OBJECT_KEY};
use crate::mapping::{BoundSql, ParameterMapping};
use crate::node::SqlNode;
use crate::placeholder::parse_placeholders;

/// Produces a [`BoundSql`] for a parameter object
#[derive(Debug, Clone)]
pub enum SqlSource {
    Static(StaticSqlSource),
    Dynamic(DynamicSqlSource),
}

impl SqlSource {
    /// Build the appropriate source for a template tree. Trees that contain
    /// no dynamic node are composed once, here.
    pub fn from_node(
        id: impl Into<String>,
        root: SqlNode,
        evaluator: Arc<dyn ExpressionEvaluator>,
        database_id: Option<String>,
    ) -> Result<Self> {
        let id = id.into();
        if root.is_dynamic() {
            Ok(SqlSource::Dynamic(DynamicSqlSource::new(
                id,
                root,
                evaluator,
                database_id,
            )))
        } else {
            StaticSqlSource::compose(&id, &root, evaluator.as_ref(), database_id.as_deref())
                .map(SqlSource::Static)
        }
    }

    pub fn bound_sql<'p>(&self, parameter: &'p Value) -> Result<BoundSql<'p>> {
        match self {
            SqlSource::Static(source) => Ok(source.bound_sql(parameter)),
            SqlSource::Dynamic(source) => source.bound_sql(parameter),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, SqlSource::Dynamic(_))
    }
}

/// Fixed statement text with pre-parsed parameter mappings
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Arc<Vec<ParameterMapping>>,
}

impl StaticSqlSource {
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings: Arc::new(parameter_mappings),
        }
    }

    /// Compose a non-dynamic tree against a `null` parameter
    fn compose(
        id: &str,
        root: &SqlNode,
        evaluator: &dyn ExpressionEvaluator,
        database_id: Option<&str>,
    ) -> Result<Self> {
        let mut context = DynamicContext::new(evaluator, Value::Null, database_id);
        root.apply(&mut context)
            .map_err(|e| composition_error(id, e))?;
        let (sql, mappings) =
            parse_placeholders(&context.sql()).map_err(|e| composition_error(id, e))?;
        debug!(statement = %id, parameters = mappings.len(), "composed static statement");
        Ok(Self::new(sql, mappings))
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bound_sql<'p>(&self, parameter: &'p Value) -> BoundSql<'p> {
        BoundSql::new(
            self.sql.clone(),
            Arc::clone(&self.parameter_mappings),
            parameter,
        )
    }
}

/// A template tree walked on every call
#[derive(Clone)]
pub struct DynamicSqlSource {
    id: String,
    root: SqlNode,
    evaluator: Arc<dyn ExpressionEvaluator>,
    database_id: Option<String>,
}

impl std::fmt::Debug for DynamicSqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicSqlSource")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

impl DynamicSqlSource {
    pub fn new(
        id: impl Into<String>,
        root: SqlNode,
        evaluator: Arc<dyn ExpressionEvaluator>,
        database_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            root,
            evaluator,
            database_id,
        }
    }

    pub fn root(&self) -> &SqlNode {
        &self.root
    }

    /// Compose the tree for `parameter`, then parse placeholders. The reserved
    /// bindings and every entry of the composition side table are exposed as
    /// additional parameters.
    pub fn bound_sql<'p>(&self, parameter: &'p Value) -> Result<BoundSql<'p>> {
        let mut context = DynamicContext::new(
            self.evaluator.as_ref(),
            parameter.clone(),
            self.database_id.as_deref(),
        );
        self.root
            .apply(&mut context)
            .map_err(|e| composition_error(&self.id, e))?;
        let reserved: Vec<(&str, Value)> = [PARAMETER_OBJECT_KEY, DATABASE_ID_KEY]
            .into_iter()
            .map(|key| {
                let value = context.bindings().get(key).cloned().unwrap_or(Value::Null);
                (key, value)
            })
            .collect();
        let (sql, additional) = context.into_parts();
        let (sql, mappings) =
            parse_placeholders(&sql).map_err(|e| composition_error(&self.id, e))?;

        let mut bound = BoundSql::new(sql, Arc::new(mappings), parameter);
        for (name, value) in reserved {
            bound.set_additional_parameter(name, value);
        }
        for (name, value) in additional {
            bound.set_additional_parameter(name, value);
        }
        debug!(
            statement = %self.id,
            parameters = bound.parameter_mappings().len(),
            "composed dynamic statement"
        );
        Ok(bound)
    }
}

fn composition_error(statement: &str, source: ScriptError) -> ScriptError {
    ScriptError::Composition {
        statement: statement.to_string(),
        source: Box::new(source),
    }
}
