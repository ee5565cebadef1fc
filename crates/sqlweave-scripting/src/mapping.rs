//! Bound statements and their parameter descriptors

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExpressionError;
use crate::value;

/// Direction of a statement parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

impl FromStr for ParameterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" => Ok(ParameterMode::In),
            "OUT" => Ok(ParameterMode::Out),
            "INOUT" => Ok(ParameterMode::InOut),
            other => Err(format!("unknown parameter mode '{}'", other)),
        }
    }
}

/// SQL type of a parameter, also used to bind `null` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JdbcType {
    Array,
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    NChar,
    NVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Clob,
    NClob,
    Boolean,
    Cursor,
    Struct,
    Null,
    Other,
    Undefined,
}

impl JdbcType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JdbcType::Array => "ARRAY",
            JdbcType::Bit => "BIT",
            JdbcType::TinyInt => "TINYINT",
            JdbcType::SmallInt => "SMALLINT",
            JdbcType::Integer => "INTEGER",
            JdbcType::BigInt => "BIGINT",
            JdbcType::Float => "FLOAT",
            JdbcType::Real => "REAL",
            JdbcType::Double => "DOUBLE",
            JdbcType::Numeric => "NUMERIC",
            JdbcType::Decimal => "DECIMAL",
            JdbcType::Char => "CHAR",
            JdbcType::Varchar => "VARCHAR",
            JdbcType::LongVarchar => "LONGVARCHAR",
            JdbcType::NChar => "NCHAR",
            JdbcType::NVarchar => "NVARCHAR",
            JdbcType::Date => "DATE",
            JdbcType::Time => "TIME",
            JdbcType::Timestamp => "TIMESTAMP",
            JdbcType::Binary => "BINARY",
            JdbcType::VarBinary => "VARBINARY",
            JdbcType::LongVarBinary => "LONGVARBINARY",
            JdbcType::Blob => "BLOB",
            JdbcType::Clob => "CLOB",
            JdbcType::NClob => "NCLOB",
            JdbcType::Boolean => "BOOLEAN",
            JdbcType::Cursor => "CURSOR",
            JdbcType::Struct => "STRUCT",
            JdbcType::Null => "NULL",
            JdbcType::Other => "OTHER",
            JdbcType::Undefined => "UNDEFINED",
        }
    }

    const ALL: [JdbcType; 31] = [
        JdbcType::Array,
        JdbcType::Bit,
        JdbcType::TinyInt,
        JdbcType::SmallInt,
        JdbcType::Integer,
        JdbcType::BigInt,
        JdbcType::Float,
        JdbcType::Real,
        JdbcType::Double,
        JdbcType::Numeric,
        JdbcType::Decimal,
        JdbcType::Char,
        JdbcType::Varchar,
        JdbcType::LongVarchar,
        JdbcType::NChar,
        JdbcType::NVarchar,
        JdbcType::Date,
        JdbcType::Time,
        JdbcType::Timestamp,
        JdbcType::Binary,
        JdbcType::VarBinary,
        JdbcType::LongVarBinary,
        JdbcType::Blob,
        JdbcType::Clob,
        JdbcType::NClob,
        JdbcType::Boolean,
        JdbcType::Cursor,
        JdbcType::Struct,
        JdbcType::Null,
        JdbcType::Other,
        JdbcType::Undefined,
    ];
}

impl FromStr for JdbcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        JdbcType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown jdbc type '{}'", s.trim()))
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor for one `?` marker of a bound statement
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Property path resolved against the side table or parameter object
    pub property: String,
    /// Target value type name
    pub java_type: Option<String>,
    /// SQL type; determines how a `null` is bound
    pub jdbc_type: Option<JdbcType>,
    pub jdbc_type_name: Option<String>,
    pub mode: ParameterMode,
    pub numeric_scale: Option<u32>,
    pub result_map: Option<String>,
    pub type_handler: Option<String>,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn is_input_only(&self) -> bool {
        self.mode == ParameterMode::In
    }
}

/// The result of composing a statement for one parameter object.
///
/// The parameter object is borrowed from the caller. `?` markers in `sql`
/// correspond one-to-one, in order, with `parameter_mappings`.
#[derive(Debug, Clone)]
pub struct BoundSql<'p> {
    sql: String,
    parameter_mappings: Arc<Vec<ParameterMapping>>,
    parameter_object: &'p Value,
    additional_parameters: HashMap<String, Value>,
}

impl<'p> BoundSql<'p> {
    pub fn new(
        sql: String,
        parameter_mappings: Arc<Vec<ParameterMapping>>,
        parameter_object: &'p Value,
    ) -> Self {
        Self {
            sql,
            parameter_mappings,
            parameter_object,
            additional_parameters: HashMap::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    pub fn parameter_object(&self) -> &'p Value {
        self.parameter_object
    }

    pub fn additional_parameters(&self) -> &HashMap<String, Value> {
        &self.additional_parameters
    }

    /// Whether the root of `name` lives in the side table
    pub fn has_additional_parameter(&self, name: &str) -> bool {
        self.additional_parameters
            .contains_key(value::root_name(name))
    }

    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.additional_parameters.insert(name.into(), value);
    }

    /// Read a (possibly nested) path from the side table
    pub fn additional_parameter(&self, name: &str) -> Result<Option<Value>, ExpressionError> {
        match self.additional_parameters.get(value::root_name(name)) {
            Some(root) => value::navigate_tail(root, value::path_tail(name)).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve the value bound to a parameter mapping.
    ///
    /// Side-table entries win; a `null` parameter yields `null`; a scalar
    /// parameter is bound as-is; otherwise the property path is read from the
    /// parameter object.
    pub fn parameter_value(&self, mapping: &ParameterMapping) -> Result<Value, ExpressionError> {
        let property = mapping.property.as_str();
        if let Some(found) = self.additional_parameter(property)? {
            return Ok(found);
        }
        match self.parameter_object {
            Value::Null => Ok(Value::Null),
            simple if value::is_simple(simple) => Ok(simple.clone()),
            object => value::property_value(object, property),
        }
    }

    /// Values of all input parameters, in marker order
    pub fn parameter_values(&self) -> Result<Vec<Value>, ExpressionError> {
        self.parameter_mappings
            .iter()
            .filter(|m| m.mode != ParameterMode::Out)
            .map(|m| self.parameter_value(m))
            .collect()
    }
}
