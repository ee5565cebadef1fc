//! Per-invocation composition state

use std::collections::HashMap;

use serde_json::Value;

use crate::expression::{Bindings, ExpressionEvaluator};

/// Mutable state for one walk of a template tree.
///
/// Holds a stack of text buffers (nodes that post-process their children's
/// output push a fresh buffer), the evaluator bindings, the side table of
/// synthesized parameters, and the unique-number counter used to name
/// iteration parameters.
pub struct DynamicContext<'e> {
    evaluator: &'e dyn ExpressionEvaluator,
    bindings: Bindings,
    additional: HashMap<String, Value>,
    buffers: Vec<String>,
    unique_number: usize,
}

impl<'e> DynamicContext<'e> {
    pub fn new(
        evaluator: &'e dyn ExpressionEvaluator,
        parameter: Value,
        database_id: Option<&str>,
    ) -> Self {
        Self {
            evaluator,
            bindings: Bindings::new(parameter, database_id),
            additional: HashMap::new(),
            buffers: vec![String::new()],
            unique_number: 0,
        }
    }

    pub fn evaluator(&self) -> &'e dyn ExpressionEvaluator {
        self.evaluator
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Bind a name for subsequent nodes, returning the value it shadowed
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Value> {
        self.bindings.insert(name, value)
    }

    /// Undo a [`bind`](Self::bind) by reinstating the shadowed value
    pub fn restore(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.bindings.insert(name, value);
            }
            None => {
                self.bindings.remove(name);
            }
        }
    }

    /// Record a synthesized parameter in the side table
    pub fn set_additional(&mut self, name: impl Into<String>, value: Value) {
        self.additional.insert(name.into(), value);
    }

    pub fn additional(&self) -> &HashMap<String, Value> {
        &self.additional
    }

    /// Append a fragment to the current buffer, followed by a space
    pub fn append_sql(&mut self, sql: &str) {
        if let Some(buffer) = self.buffers.last_mut() {
            buffer.push_str(sql);
            buffer.push(' ');
        }
    }

    /// Start capturing output into an isolated buffer
    pub fn push_buffer(&mut self) {
        self.buffers.push(String::new());
    }

    /// Stop capturing and return what was written since the matching push
    pub fn pop_buffer(&mut self) -> String {
        if self.buffers.len() > 1 {
            self.buffers.pop().unwrap_or_default()
        } else {
            String::new()
        }
    }

    /// Next value of the per-context counter
    pub fn next_unique_number(&mut self) -> usize {
        let number = self.unique_number;
        self.unique_number += 1;
        number
    }

    /// The composed text so far, trimmed
    pub fn sql(&self) -> String {
        self.buffers
            .first()
            .map(|b| b.trim().to_string())
            .unwrap_or_default()
    }

    /// Consume the context into its composed text and side table
    pub fn into_parts(self) -> (String, HashMap<String, Value>) {
        let sql = self.sql();
        (sql, self.additional)
    }
}
