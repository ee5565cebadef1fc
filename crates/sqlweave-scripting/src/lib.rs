//! Dynamic SQL composition for sqlweave
//!
//! A statement template is written in a small tag language (`<if>`, `<where>`,
//! `<foreach>`, ...) embedded in SQL text. [`ScriptBuilder`] turns the markup
//! into a [`SqlSource`] once; at call time the source composes a [`BoundSql`]
//! for a parameter object:
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use sqlweave_scripting::{ScriptBuilder, SimpleExpressionEvaluator};
//!
//! let source = ScriptBuilder::new(Arc::new(SimpleExpressionEvaluator::new()))
//!     .build(
//!         "blog.byIds",
//!         r#"select * from blog where id in
//!            <foreach collection="ids" item="id" open="(" separator="," close=")">#{id}</foreach>"#,
//!     )
//!     .unwrap();
//!
//! let param = json!({"ids": [1, 2, 3]});
//! let bound = source.bound_sql(&param).unwrap();
//! assert!(bound.sql().ends_with("(?,?,?)"));
//! assert_eq!(bound.parameter_mappings().len(), 3);
//! ```

pub mod builder;
pub mod context;
pub mod error;
pub mod expression;
pub mod mapping;
pub mod node;
pub mod parser;
pub mod placeholder;
pub mod source;
pub mod token;
pub mod value;

pub use builder::{apply_namespace, parse_fragment, FragmentRegistry, ScriptBuilder};
pub use context::DynamicContext;
pub use error::{ExpressionError, Result, ScriptError};
pub use expression::{
    Bindings, ExpressionEvaluator, SimpleExpressionEvaluator, DATABASE_ID_KEY,
    PARAMETER_OBJECT_KEY,
};
pub use mapping::{BoundSql, JdbcType, ParameterMapping, ParameterMode};
pub use node::{
    ChooseSqlNode, ForEachSqlNode, IfSqlNode, SqlNode, TextSqlNode, TrimSqlNode, VarDeclSqlNode,
};
pub use parser::{XElement, XNode};
pub use placeholder::parse_placeholders;
pub use source::{DynamicSqlSource, SqlSource, StaticSqlSource};
