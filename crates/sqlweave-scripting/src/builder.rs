//! Template builder: markup to SQL source
//!
//! Building happens once per statement at configuration time. `<include>`
//! references are resolved first, as a rewrite that produces a new tree and
//! leaves the fragment registry untouched. The rewritten tree is then mapped
//! onto [`SqlNode`]s and wrapped in a static or dynamic [`SqlSource`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ScriptError};
use crate::expression::ExpressionEvaluator;
use crate::node::{
    ChooseSqlNode, ForEachSqlNode, IfSqlNode, SqlNode, TrimSqlNode, VarDeclSqlNode,
};
use crate::parser::{self, XElement, XNode};
use crate::source::SqlSource;

/// Reusable `<sql>` fragments keyed by fully qualified id
pub type FragmentRegistry = HashMap<String, XElement>;

/// Qualify `reference` with `namespace` unless it already names one
pub fn apply_namespace(namespace: Option<&str>, reference: &str) -> String {
    match namespace {
        Some(ns) if !reference.contains('.') => format!("{}.{}", ns, reference),
        _ => reference.to_string(),
    }
}

/// Parse fragment markup into an element that can be registered
pub fn parse_fragment(id: &str, script: &str) -> Result<XElement> {
    let mut element = XElement::new("sql");
    element.attributes.push(("id".to_string(), id.to_string()));
    element.children = parser::parse(script)?;
    Ok(element)
}

/// Builds [`SqlSource`]s from template markup
pub struct ScriptBuilder<'a> {
    evaluator: Arc<dyn ExpressionEvaluator>,
    fragments: Option<&'a FragmentRegistry>,
    namespace: Option<String>,
    database_id: Option<String>,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            evaluator,
            fragments: None,
            namespace: None,
            database_id: None,
        }
    }

    pub fn fragments(mut self, fragments: &'a FragmentRegistry) -> Self {
        self.fragments = Some(fragments);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn database_id(mut self, database_id: Option<String>) -> Self {
        self.database_id = database_id;
        self
    }

    /// Parse and build the template of statement `id`
    pub fn build(&self, id: &str, script: &str) -> Result<SqlSource> {
        let mut nodes = parser::parse(script)?;
        let wrapped = matches!(nodes.as_slice(), [XNode::Element(root)] if root.name == "script");
        if wrapped {
            if let Some(XNode::Element(root)) = nodes.pop() {
                nodes = root.children;
            }
        }
        self.build_nodes(id, &nodes)
    }

    /// Build from already parsed markup
    pub fn build_nodes(&self, id: &str, nodes: &[XNode]) -> Result<SqlSource> {
        let rewritten = self.apply_includes(nodes, &mut Vec::new())?;
        let root = SqlNode::mixed(self.parse_dynamic_tags(&rewritten)?);
        let source =
            SqlSource::from_node(id, root, Arc::clone(&self.evaluator), self.database_id.clone())?;
        debug!(statement = %id, dynamic = source.is_dynamic(), "built statement source");
        Ok(source)
    }

    /// Replace every `<include refid>` with the children of the referenced
    /// fragment, recursively
    pub fn apply_includes(&self, nodes: &[XNode], stack: &mut Vec<String>) -> Result<Vec<XNode>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                XNode::Element(element) if element.name == "include" => {
                    let refid = required(element, "refid")?;
                    let qualified = apply_namespace(self.namespace.as_deref(), refid);
                    if stack.contains(&qualified) {
                        return Err(ScriptError::builder(format!(
                            "Circular include of SQL fragment '{}' ({})",
                            qualified,
                            stack.join(" -> ")
                        )));
                    }
                    let fragment = self
                        .fragments
                        .and_then(|fragments| fragments.get(&qualified))
                        .ok_or_else(|| ScriptError::UnknownFragment {
                            refid: qualified.clone(),
                        })?;

                    stack.push(qualified);
                    let expanded = self.apply_includes(&fragment.children, stack);
                    stack.pop();
                    out.extend(expanded?);
                }
                XNode::Element(element) => {
                    let mut copy = XElement::new(element.name.clone());
                    copy.attributes = element.attributes.clone();
                    copy.line = element.line;
                    copy.children = self.apply_includes(&element.children, stack)?;
                    out.push(XNode::Element(copy));
                }
                XNode::Text(text) => out.push(XNode::Text(text.clone())),
            }
        }
        Ok(out)
    }

    fn parse_dynamic_tags(&self, nodes: &[XNode]) -> Result<Vec<SqlNode>> {
        let mut contents = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                XNode::Text(text) => contents.push(SqlNode::text(text.clone())),
                XNode::Element(element) => contents.push(self.handle_element(element)?),
            }
        }
        Ok(contents)
    }

    fn handle_element(&self, element: &XElement) -> Result<SqlNode> {
        let node = match element.name.as_str() {
            "trim" => SqlNode::Trim(TrimSqlNode::new(
                self.mixed(element)?,
                element.attribute("prefix"),
                element.attribute("prefixOverrides"),
                element.attribute("suffix"),
                element.attribute("suffixOverrides"),
            )),
            "where" => SqlNode::Trim(TrimSqlNode::where_clause(self.mixed(element)?)),
            "set" => SqlNode::Trim(TrimSqlNode::set_clause(self.mixed(element)?)),
            "foreach" => {
                let mut foreach =
                    ForEachSqlNode::new(self.mixed(element)?, required(element, "collection")?);
                if let Some(item) = element.attribute("item") {
                    foreach = foreach.item(item);
                }
                if let Some(index) = element.attribute("index") {
                    foreach = foreach.index(index);
                }
                if let Some(open) = element.attribute("open") {
                    foreach = foreach.open(open);
                }
                if let Some(close) = element.attribute("close") {
                    foreach = foreach.close(close);
                }
                if let Some(separator) = element.attribute("separator") {
                    foreach = foreach.separator(separator);
                }
                SqlNode::ForEach(foreach)
            }
            "if" => SqlNode::If(self.if_node(element)?),
            "choose" => SqlNode::Choose(self.choose_node(element)?),
            branch @ ("when" | "otherwise") => {
                return Err(ScriptError::builder(format!(
                    "Element <{}> outside of <choose> in SQL statement (line {}).",
                    branch, element.line
                )))
            }
            "bind" => SqlNode::Bind(VarDeclSqlNode::new(
                required(element, "name")?,
                required(element, "value")?,
            )),
            other => {
                return Err(ScriptError::builder(format!(
                    "Unknown element <{}> in SQL statement (line {}).",
                    other, element.line
                )))
            }
        };
        Ok(node)
    }

    fn mixed(&self, element: &XElement) -> Result<SqlNode> {
        Ok(SqlNode::mixed(self.parse_dynamic_tags(&element.children)?))
    }

    fn if_node(&self, element: &XElement) -> Result<IfSqlNode> {
        let test = required(element, "test")?;
        Ok(IfSqlNode::new(test, self.mixed(element)?))
    }

    fn choose_node(&self, element: &XElement) -> Result<ChooseSqlNode> {
        let mut when = Vec::new();
        let mut otherwise = Vec::new();
        for child in &element.children {
            match child {
                XNode::Element(branch) if matches!(branch.name.as_str(), "when" | "if") => {
                    when.push(self.if_node(branch)?)
                }
                XNode::Element(branch) if branch.name == "otherwise" => {
                    otherwise.push(self.mixed(branch)?)
                }
                XNode::Element(branch) => {
                    return Err(ScriptError::builder(format!(
                        "Unknown element <{}> in choose statement (line {}).",
                        branch.name, branch.line
                    )))
                }
                XNode::Text(_) => {}
            }
        }
        ChooseSqlNode::new(when, otherwise)
    }
}

fn required<'e>(element: &'e XElement, attribute: &str) -> Result<&'e str> {
    element.attribute(attribute).ok_or_else(|| {
        ScriptError::builder(format!(
            "<{}> requires the '{}' attribute (line {}).",
            element.name, attribute, element.line
        ))
    })
}
