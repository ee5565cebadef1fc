//! Template node AST
//!
//! A statement template is a tree of [`SqlNode`]s. Trees are immutable once
//! built and shared read-only; every call walks the tree with its own
//! [`DynamicContext`]. `apply` reports whether the node contributed content,
//! which is what `choose` uses to pick a branch.

use serde_json::Value;
use tracing::trace;

use crate::context::DynamicContext;
use crate::error::{ExpressionError, Result, ScriptError};
use crate::token::parse_tokens;
use crate::value;

/// Prefix for iteration-generated parameter names
pub const ITEM_PREFIX: &str = "__frch_";

/// One element of a statement template
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    /// Literal text, possibly holding `${...}` raw substitutions
    Text(TextSqlNode),
    /// Children applied in order
    Mixed(Vec<SqlNode>),
    /// `<if test>`
    If(IfSqlNode),
    /// `<choose>` with `<when>` branches and an optional `<otherwise>`
    Choose(ChooseSqlNode),
    /// `<trim>`, `<where>` and `<set>`
    Trim(TrimSqlNode),
    /// `<foreach>`
    ForEach(ForEachSqlNode),
    /// `<bind>`
    Bind(VarDeclSqlNode),
}

impl SqlNode {
    pub fn text(text: impl Into<String>) -> Self {
        SqlNode::Text(TextSqlNode::new(text))
    }

    pub fn mixed(children: Vec<SqlNode>) -> Self {
        SqlNode::Mixed(children)
    }

    /// Walk this node, writing into `context`
    pub fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        match self {
            SqlNode::Text(node) => node.apply(context),
            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply(context)?;
                }
                Ok(true)
            }
            SqlNode::If(node) => node.apply(context),
            SqlNode::Choose(node) => node.apply(context),
            SqlNode::Trim(node) => node.apply(context),
            SqlNode::ForEach(node) => node.apply(context),
            SqlNode::Bind(node) => node.apply(context),
        }
    }

    /// Whether composing this tree depends on the parameter object
    pub fn is_dynamic(&self) -> bool {
        match self {
            SqlNode::Text(node) => node.is_dynamic(),
            SqlNode::Mixed(children) => children.iter().any(SqlNode::is_dynamic),
            _ => true,
        }
    }
}

/// Literal statement text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSqlNode {
    text: String,
}

impl TextSqlNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_dynamic(&self) -> bool {
        self.text.contains("${")
    }

    fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        if !self.is_dynamic() {
            context.append_sql(&self.text);
            return Ok(true);
        }

        let parameter = context.bindings().parameter().clone();
        if parameter.is_null() || value::is_simple(&parameter) {
            context.bind("value", parameter);
        }

        let evaluator = context.evaluator();
        let bindings = context.bindings();
        let text = parse_tokens(&self.text, "${", "}", |expression| {
            match evaluator.evaluate_value(expression, bindings) {
                Ok(found) => Ok(value::to_text(&found)),
                // Raw substitution of an unknown name renders as empty text
                Err(ExpressionError::Undefined { name }) => {
                    trace!(%name, "raw substitution of undefined name");
                    Ok(String::new())
                }
                Err(e) => Err(ScriptError::expression(expression, e)),
            }
        })?;
        context.append_sql(&text);
        Ok(true)
    }
}

/// Conditional fragment
#[derive(Debug, Clone, PartialEq)]
pub struct IfSqlNode {
    test: String,
    contents: Box<SqlNode>,
}

impl IfSqlNode {
    pub fn new(test: impl Into<String>, contents: SqlNode) -> Self {
        Self {
            test: test.into(),
            contents: Box::new(contents),
        }
    }

    pub fn test(&self) -> &str {
        &self.test
    }

    fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        let passed = context
            .evaluator()
            .evaluate_bool(&self.test, context.bindings())
            .map_err(|e| ScriptError::expression(&self.test, e))?;
        if passed {
            self.contents.apply(context)?;
        }
        Ok(passed)
    }
}

/// First-match selection among conditional branches
#[derive(Debug, Clone, PartialEq)]
pub struct ChooseSqlNode {
    when: Vec<IfSqlNode>,
    otherwise: Option<Box<SqlNode>>,
}

impl ChooseSqlNode {
    /// Build a choose node. At most one default branch may be given.
    pub fn new(when: Vec<IfSqlNode>, mut otherwise: Vec<SqlNode>) -> Result<Self> {
        if otherwise.len() > 1 {
            return Err(ScriptError::builder(
                "Too many default (otherwise) elements in choose statement.",
            ));
        }
        Ok(Self {
            when,
            otherwise: otherwise.pop().map(Box::new),
        })
    }

    fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        for branch in &self.when {
            if branch.apply(context)? {
                return Ok(true);
            }
        }
        match &self.otherwise {
            Some(default) => {
                default.apply(context)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Wraps child output with a prefix/suffix after stripping override tokens
#[derive(Debug, Clone, PartialEq)]
pub struct TrimSqlNode {
    contents: Box<SqlNode>,
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
}

impl TrimSqlNode {
    /// `prefix_overrides` and `suffix_overrides` are `|`-separated token lists
    pub fn new(
        contents: SqlNode,
        prefix: Option<&str>,
        prefix_overrides: Option<&str>,
        suffix: Option<&str>,
        suffix_overrides: Option<&str>,
    ) -> Self {
        Self {
            contents: Box::new(contents),
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
            prefix_overrides: parse_overrides(prefix_overrides),
            suffix_overrides: parse_overrides(suffix_overrides),
        }
    }

    /// `<where>`: prefix `WHERE`, leading `AND`/`OR` removed
    pub fn where_clause(contents: SqlNode) -> Self {
        Self::new(
            contents,
            Some("WHERE"),
            Some("AND |OR |AND\n|OR\n|AND\r|OR\r|AND\t|OR\t"),
            None,
            None,
        )
    }

    /// `<set>`: prefix `SET`, trailing comma removed
    pub fn set_clause(contents: SqlNode) -> Self {
        Self::new(contents, Some("SET"), None, None, Some(","))
    }

    fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        context.push_buffer();
        let applied = self.contents.apply(context);
        let body = context.pop_buffer();
        applied?;

        match self.trim(&body) {
            Some(text) => {
                context.append_sql(&text);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn trim(&self, body: &str) -> Option<String> {
        let mut content = body.trim();
        if content.is_empty() {
            return None;
        }

        if let Some(token) = self
            .prefix_overrides
            .iter()
            .find(|token| starts_with_ignore_case(content, token))
        {
            content = content[token.len()..].trim_start();
        }

        if let Some(token) = self.suffix_overrides.iter().find(|token| {
            ends_with_ignore_case(content, token) || ends_with_ignore_case(content, token.trim())
        }) {
            let cut = token.trim().len();
            content = content[..content.len() - cut].trim_end();
        }

        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(content);
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        Some(out)
    }
}

fn parse_overrides(overrides: Option<&str>) -> Vec<String> {
    overrides
        .map(|list| {
            list.split('|')
                .filter(|token| !token.is_empty())
                .map(str::to_uppercase)
                .collect()
        })
        .unwrap_or_default()
}

fn starts_with_ignore_case(text: &str, token: &str) -> bool {
    text.get(..token.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(token))
}

fn ends_with_ignore_case(text: &str, token: &str) -> bool {
    !token.is_empty()
        && text.len() >= token.len()
        && text
            .get(text.len() - token.len()..)
            .map_or(false, |tail| tail.eq_ignore_ascii_case(token))
}

/// Iteration over a collection, array or map
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachSqlNode {
    contents: Box<SqlNode>,
    collection: String,
    item: Option<String>,
    index: Option<String>,
    open: Option<String>,
    close: Option<String>,
    separator: Option<String>,
}

impl ForEachSqlNode {
    pub fn new(contents: SqlNode, collection: impl Into<String>) -> Self {
        Self {
            contents: Box::new(contents),
            collection: collection.into(),
            item: None,
            index: None,
            open: None,
            close: None,
            separator: None,
        }
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = Some(open.into());
        self
    }

    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = Some(close.into());
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        let elements = context
            .evaluator()
            .evaluate_iterable(&self.collection, context.bindings())
            .map_err(|e| ScriptError::expression(&self.collection, e))?;
        if elements.is_empty() {
            return Ok(false);
        }

        let mut parts = Vec::with_capacity(elements.len());
        for (key, element) in elements {
            let number = context.next_unique_number();
            let text = self.apply_element(context, number, key, element)?;
            if !text.is_empty() {
                parts.push(text);
            }
        }

        let mut sql = String::new();
        sql.push_str(self.open.as_deref().unwrap_or_default());
        sql.push_str(&parts.join(self.separator.as_deref().unwrap_or_default()));
        sql.push_str(self.close.as_deref().unwrap_or_default());
        context.append_sql(&sql);
        Ok(true)
    }

    fn apply_element(
        &self,
        context: &mut DynamicContext<'_>,
        number: usize,
        key: Value,
        element: Value,
    ) -> Result<String> {
        let previous_index = self.index.as_deref().map(|index| {
            context.set_additional(itemize(index, number), key.clone());
            (index, context.bind(index, key))
        });
        let previous_item = self.item.as_deref().map(|item| {
            context.set_additional(itemize(item, number), element.clone());
            (item, context.bind(item, element))
        });

        context.push_buffer();
        let applied = self.contents.apply(context);
        let body = context.pop_buffer();

        if let Some((item, previous)) = previous_item {
            context.restore(item, previous);
        }
        if let Some((index, previous)) = previous_index {
            context.restore(index, previous);
        }
        applied?;

        let rewritten = parse_tokens::<_, ScriptError>(body.trim(), "#{", "}", |content| {
            let mut content = content.to_string();
            for name in [self.item.as_deref(), self.index.as_deref()].into_iter().flatten() {
                content = rewrite_root(&content, name, &itemize(name, number));
            }
            Ok(format!("#{{{}}}", content))
        })?;
        Ok(rewritten)
    }
}

/// Unique parameter name for one iteration of `name`
pub fn itemize(name: &str, number: usize) -> String {
    format!("{}{}_{}", ITEM_PREFIX, name, number)
}

/// Replace `name` at the start of placeholder content when it is the whole
/// property root (followed by nothing, `.`, `[`, `,`, `:` or whitespace)
fn rewrite_root(content: &str, name: &str, replacement: &str) -> String {
    let leading = content.len() - content.trim_start().len();
    let body = &content[leading..];
    match body.strip_prefix(name) {
        Some(rest)
            if rest
                .chars()
                .next()
                .map_or(true, |c| matches!(c, '.' | '[' | ',' | ':') || c.is_whitespace()) =>
        {
            format!("{}{}{}", &content[..leading], replacement, rest)
        }
        _ => content.to_string(),
    }
}

/// Variable declaration visible to the rest of the composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDeclSqlNode {
    name: String,
    expression: String,
}

impl VarDeclSqlNode {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }

    fn apply(&self, context: &mut DynamicContext<'_>) -> Result<bool> {
        let value = context
            .evaluator()
            .evaluate_value(&self.expression, context.bindings())
            .map_err(|e| ScriptError::expression(&self.expression, e))?;
        context.set_additional(self.name.clone(), value.clone());
        context.bind(&self.name, value);
        Ok(true)
    }
}
