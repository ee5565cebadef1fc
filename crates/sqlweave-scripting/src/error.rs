//! Scripting error types

use thiserror::Error;

/// Errors raised while evaluating an expression against the bindings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Invalid expression '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("Undefined name '{name}'")]
    Undefined { name: String },

    #[error("Cannot read '{segment}' from a {kind} value")]
    NotNavigable { segment: String, kind: &'static str },

    #[error("Type error: {message}")]
    Type { message: String },
}

/// Template building and composition errors
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Template parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Builder error: {message}")]
    Builder { message: String },

    #[error("Could not find SQL fragment '{refid}'")]
    UnknownFragment { refid: String },

    #[error("Error evaluating expression '{expression}': {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Invalid parameter placeholder '{content}': {message}")]
    Placeholder { content: String, message: String },

    #[error("Error composing statement '{statement}': {source}")]
    Composition {
        statement: String,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    pub(crate) fn builder(message: impl Into<String>) -> Self {
        ScriptError::Builder {
            message: message.into(),
        }
    }

    pub(crate) fn expression(expression: &str, source: ExpressionError) -> Self {
        ScriptError::Expression {
            expression: expression.to_string(),
            source,
        }
    }
}

/// Scripting result type
pub type Result<T> = std::result::Result<T, ScriptError>;
