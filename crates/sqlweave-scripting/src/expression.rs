//! Expression evaluation boundary
//!
//! Template nodes never interpret expressions themselves. They hand the
//! textual expression and the current [`Bindings`] to an
//! [`ExpressionEvaluator`]. [`SimpleExpressionEvaluator`] is the default
//! implementation: property paths, literals, comparisons, boolean
//! connectives, `+`/`-` and a handful of collection/string methods.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Number, Value};

use crate::error::ExpressionError;
use crate::value;

/// Reserved binding that exposes the raw parameter object
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Reserved binding that exposes the configured database id
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Named variables visible to the evaluator during one composition
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: HashMap<String, Value>,
}

impl Bindings {
    /// Bindings for a parameter object, with the reserved entries set
    pub fn new(parameter: Value, database_id: Option<&str>) -> Self {
        let mut map = HashMap::new();
        map.insert(PARAMETER_OBJECT_KEY.to_string(), parameter);
        map.insert(
            DATABASE_ID_KEY.to_string(),
            database_id.map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        Self { map }
    }

    /// Bind a name, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.map.insert(name.into(), value)
    }

    /// Remove a binding, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.remove(name)
    }

    /// Get an explicitly bound name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// The raw parameter object
    pub fn parameter(&self) -> &Value {
        self.map.get(PARAMETER_OBJECT_KEY).unwrap_or(&Value::Null)
    }

    /// Resolve a root name: explicit bindings first, then a property of the
    /// parameter object. Missing properties of an object parameter read as
    /// `null`; any other unknown name is undefined.
    pub fn resolve(&self, name: &str) -> Result<Value, ExpressionError> {
        if let Some(found) = self.map.get(name) {
            return Ok(found.clone());
        }
        match self.parameter() {
            Value::Object(fields) => Ok(fields.get(name).cloned().unwrap_or(Value::Null)),
            _ => Err(ExpressionError::Undefined {
                name: name.to_string(),
            }),
        }
    }
}

/// Pluggable evaluator for the test/value/collection expressions of a template
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate a test expression
    fn evaluate_bool(&self, expression: &str, bindings: &Bindings) -> Result<bool, ExpressionError>;

    /// Evaluate a value expression
    fn evaluate_value(&self, expression: &str, bindings: &Bindings)
        -> Result<Value, ExpressionError>;

    /// Evaluate a collection expression into `(index_or_key, element)` pairs.
    /// Arrays yield their positions, objects their keys.
    fn evaluate_iterable(
        &self,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<Vec<(Value, Value)>, ExpressionError> {
        match self.evaluate_value(expression, bindings)? {
            Value::Array(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i as u64), item))
                .collect()),
            Value::Object(entries) => Ok(entries
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect()),
            Value::Null => Err(ExpressionError::Type {
                message: format!("the expression '{}' evaluated to a null value", expression),
            }),
            other => Err(ExpressionError::Type {
                message: format!(
                    "the expression '{}' evaluated to a {} which is not iterable",
                    expression,
                    value::kind(&other)
                ),
            }),
        }
    }
}

/// Truthiness used by test expressions: `null` and `false` are false, numbers
/// are true when non-zero, everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path { root: String, steps: Vec<Step> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Field(String),
    Index(Box<Expr>),
    Call(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
}

/// Default expression language with a parsed-expression cache
#[derive(Debug, Default)]
pub struct SimpleExpressionEvaluator {
    parsed: DashMap<String, Arc<Expr>>,
}

impl SimpleExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct expressions parsed so far
    pub fn cached_expressions(&self) -> usize {
        self.parsed.len()
    }

    fn parse(&self, expression: &str) -> Result<Arc<Expr>, ExpressionError> {
        if let Some(found) = self.parsed.get(expression) {
            return Ok(Arc::clone(found.value()));
        }
        let tokens = tokenize(expression)?;
        let mut parser = ExprParser {
            expression,
            tokens,
            position: 0,
        };
        let expr = parser.parse_or()?;
        if parser.position < parser.tokens.len() {
            return Err(syntax(expression, "unexpected trailing input"));
        }
        let expr = Arc::new(expr);
        self.parsed
            .insert(expression.to_string(), Arc::clone(&expr));
        Ok(expr)
    }
}

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate_bool(&self, expression: &str, bindings: &Bindings) -> Result<bool, ExpressionError> {
        let expr = self.parse(expression)?;
        Ok(truthy(&eval(&expr, bindings)?))
    }

    fn evaluate_value(
        &self,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError> {
        let expr = self.parse(expression)?;
        eval(&expr, bindings)
    }
}

fn syntax(expression: &str, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        expression: expression.to_string(),
        message: message.into(),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let op = match two.as_str() {
            "==" => Some("=="),
            "!=" => Some("!="),
            "<=" => Some("<="),
            ">=" => Some(">="),
            "&&" => Some("and"),
            "||" => Some("or"),
            _ => None,
        };
        if let Some(op) = op {
            tokens.push(Token::Op(op));
            i += 2;
            continue;
        }

        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            '.' => tokens.push(Token::Dot),
            '<' => tokens.push(Token::Op("<")),
            '>' => tokens.push(Token::Op(">")),
            '!' => tokens.push(Token::Op("not")),
            '+' => tokens.push(Token::Op("+")),
            '-' => tokens.push(Token::Op("-")),
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => break,
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                        None => return Err(syntax(expression, "unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            d if d.is_ascii_digit() => {
                let start = i;
                while i + 1 < chars.len() && (chars[i + 1].is_ascii_digit() || chars[i + 1] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..=i].iter().collect();
                let number = if literal.contains('.') {
                    literal
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                } else {
                    literal.parse::<i64>().ok().map(Number::from)
                };
                let number =
                    number.ok_or_else(|| syntax(expression, format!("bad number '{}'", literal)))?;
                tokens.push(Token::Num(number));
            }
            a if a.is_alphabetic() || a == '_' || a == '$' => {
                let start = i;
                while i + 1 < chars.len()
                    && (chars[i + 1].is_alphanumeric() || chars[i + 1] == '_' || chars[i + 1] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..=i].iter().collect();
                let token = match word.as_str() {
                    "and" => Token::Op("and"),
                    "or" => Token::Op("or"),
                    "not" => Token::Op("not"),
                    "eq" => Token::Op("=="),
                    "neq" => Token::Op("!="),
                    "lt" => Token::Op("<"),
                    "lte" => Token::Op("<="),
                    "gt" => Token::Op(">"),
                    "gte" => Token::Op(">="),
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            other => {
                return Err(syntax(expression, format!("unexpected character '{}'", other)));
            }
        }
        i += 1;
    }

    Ok(tokens)
}

struct ExprParser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(found)) if *found == op) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.next() {
            Some(found) if found == expected => Ok(()),
            _ => Err(syntax(self.expression, format!("expected {:?}", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat_op("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat_op("and") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_op("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => CompareOp::Eq,
            Some(Token::Op("!=")) => CompareOp::Ne,
            Some(Token::Op("<")) => CompareOp::Lt,
            Some(Token::Op("<=")) => CompareOp::Le,
            Some(Token::Op(">")) => CompareOp::Gt,
            Some(Token::Op(">=")) => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.position += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_op("+") {
                ArithOp::Add
            } else if self.eat_op("-") {
                ArithOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "null" => Ok(Expr::Literal(Value::Null)),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ => self.parse_path(word),
            },
            _ => Err(syntax(self.expression, "expected a value")),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, ExpressionError> {
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.position += 1;
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(syntax(self.expression, "expected a property name")),
                    };
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.position += 1;
                        self.expect(Token::RParen)?;
                        steps.push(Step::Call(name));
                    } else {
                        steps.push(Step::Field(name));
                    }
                }
                Some(Token::LBracket) => {
                    self.position += 1;
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    steps.push(Step::Index(Box::new(index)));
                }
                _ => return Ok(Expr::Path { root, steps }),
            }
        }
    }
}

fn eval(expr: &Expr, bindings: &Bindings) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path { root, steps } => {
            let mut current = bindings.resolve(root)?;
            for step in steps {
                current = apply_step(current, step, bindings)?;
            }
            Ok(current)
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, bindings)?))),
        Expr::Neg(inner) => match eval(inner, bindings)? {
            Value::Number(n) => Ok(negate(&n)),
            other => Err(ExpressionError::Type {
                message: format!("cannot negate a {}", value::kind(&other)),
            }),
        },
        Expr::And(l, r) => {
            if !truthy(&eval(l, bindings)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(r, bindings)?)))
        }
        Expr::Or(l, r) => {
            if truthy(&eval(l, bindings)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(r, bindings)?)))
        }
        Expr::Compare(op, l, r) => {
            let left = eval(l, bindings)?;
            let right = eval(r, bindings)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
        Expr::Arith(op, l, r) => {
            let left = eval(l, bindings)?;
            let right = eval(r, bindings)?;
            arith(*op, &left, &right)
        }
    }
}

fn apply_step(current: Value, step: &Step, bindings: &Bindings) -> Result<Value, ExpressionError> {
    match step {
        Step::Field(name) => match current {
            Value::Null => Ok(Value::Null),
            Value::Object(mut fields) => Ok(fields.remove(name).unwrap_or(Value::Null)),
            other => Err(ExpressionError::NotNavigable {
                segment: name.clone(),
                kind: value::kind(&other),
            }),
        },
        Step::Index(index) => {
            let index = eval(index, bindings)?;
            match (current, index) {
                (Value::Null, _) => Ok(Value::Null),
                (Value::Array(items), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| items.get(i as usize).cloned())
                    .unwrap_or(Value::Null)),
                (Value::Object(mut fields), Value::String(key)) => {
                    Ok(fields.remove(&key).unwrap_or(Value::Null))
                }
                (other, index) => Err(ExpressionError::NotNavigable {
                    segment: value::to_text(&index),
                    kind: value::kind(&other),
                }),
            }
        }
        Step::Call(method) => {
            let size = match &current {
                Value::Array(items) => Some(items.len()),
                Value::Object(fields) => Some(fields.len()),
                Value::String(s) => Some(s.chars().count()),
                _ => None,
            };
            match (method.as_str(), size) {
                ("size" | "length", Some(n)) => Ok(Value::from(n as u64)),
                ("isEmpty", Some(n)) => Ok(Value::Bool(n == 0)),
                ("trim", _) if current.is_string() => Ok(Value::String(
                    current.as_str().unwrap_or_default().trim().to_string(),
                )),
                _ => Err(ExpressionError::Type {
                    message: format!(
                        "method '{}()' is not available on a {} value",
                        method,
                        value::kind(&current)
                    ),
                }),
            }
        }
    }
}

fn negate(n: &Number) -> Value {
    if let Some(negated) = n.as_i64().and_then(i64::checked_neg) {
        Value::from(negated)
    } else {
        Number::from_f64(-n.as_f64().unwrap_or_default())
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };

    match (op, ordering) {
        (CompareOp::Eq, ordering) => Ok(ordering == Some(Ordering::Equal) || left == right),
        (CompareOp::Ne, ordering) => Ok(!(ordering == Some(Ordering::Equal) || left == right)),
        (_, None) => Err(ExpressionError::Type {
            message: format!(
                "cannot order a {} against a {}",
                value::kind(left),
                value::kind(right)
            ),
        }),
        (CompareOp::Lt, Some(o)) => Ok(o == Ordering::Less),
        (CompareOp::Le, Some(o)) => Ok(o != Ordering::Greater),
        (CompareOp::Gt, Some(o)) => Ok(o == Ordering::Greater),
        (CompareOp::Ge, Some(o)) => Ok(o != Ordering::Less),
    }
}

fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match (op, left, right) {
        (ArithOp::Add, Value::String(_), _) | (ArithOp::Add, _, Value::String(_)) => Ok(
            Value::String(format!("{}{}", value::to_text(left), value::to_text(right))),
        ),
        (_, Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                let result = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                };
                if let Some(result) = result {
                    return Ok(Value::from(result));
                }
            }
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
            };
            Ok(Number::from_f64(result).map_or(Value::Null, Value::Number))
        }
        _ => Err(ExpressionError::Type {
            message: format!(
                "unsupported operands: {} and {}",
                value::kind(left),
                value::kind(right)
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bindings(parameter: Value) -> Bindings {
        Bindings::new(parameter, None)
    }

    #[test]
    fn test_null_checks_and_connectives() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"name": "ann", "age": null}));

        assert!(evaluator.evaluate_bool("name != null", &b).unwrap());
        assert!(evaluator.evaluate_bool("age == null", &b).unwrap());
        assert!(!evaluator
            .evaluate_bool("name != null and age != null", &b)
            .unwrap());
        assert!(evaluator
            .evaluate_bool("name == 'bob' or age == null", &b)
            .unwrap());
        assert!(evaluator.evaluate_bool("!(age != null)", &b).unwrap());
    }

    #[test]
    fn test_missing_property_on_object_is_null() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"name": "ann"}));
        assert!(evaluator.evaluate_bool("title == null", &b).unwrap());
    }

    #[test]
    fn test_undefined_name_on_scalar_parameter_fails() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!(5));
        let err = evaluator.evaluate_bool("title == null", &b).unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Undefined {
                name: "title".to_string()
            }
        );
    }

    #[test]
    fn test_numeric_comparisons_and_methods() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"ids": [1, 2, 3], "limit": 10, "name": "  x "}));

        assert!(evaluator.evaluate_bool("ids.size() > 0", &b).unwrap());
        assert!(evaluator.evaluate_bool("ids[2] == 3", &b).unwrap());
        assert!(evaluator.evaluate_bool("limit gte 10", &b).unwrap());
        assert!(evaluator.evaluate_bool("limit - 1 < 10", &b).unwrap());
        assert!(!evaluator.evaluate_bool("ids.isEmpty()", &b).unwrap());
        assert_eq!(
            evaluator.evaluate_value("name.trim()", &b).unwrap(),
            json!("x")
        );
    }

    #[test]
    fn test_string_concatenation() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"name": "ann"}));
        assert_eq!(
            evaluator.evaluate_value("'%' + name + '%'", &b).unwrap(),
            json!("%ann%")
        );
    }

    #[test]
    fn test_syntax_error() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({}));
        let err = evaluator.evaluate_bool("name ==", &b).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }));
        let err = evaluator.evaluate_bool("name # 1", &b).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }));
    }

    #[test]
    fn test_parsed_expressions_are_cached() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"a": 1}));
        evaluator.evaluate_bool("a == 1", &b).unwrap();
        evaluator.evaluate_bool("a == 1", &b).unwrap();
        assert_eq!(evaluator.cached_expressions(), 1);
    }

    #[test]
    fn test_iterable_of_object_yields_keys() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"m": {"k": "v"}}));
        let items = evaluator.evaluate_iterable("m", &b).unwrap();
        assert_eq!(items, vec![(json!("k"), json!("v"))]);

        let err = evaluator.evaluate_iterable("missing", &b).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { .. }));
    }

    #[test]
    fn test_arithmetic_at_integer_bounds() {
        let evaluator = SimpleExpressionEvaluator::new();
        let b = bindings(json!({"min": i64::MIN, "max": i64::MAX, "big": u64::MAX}));

        let negated = evaluator.evaluate_value("-min", &b).unwrap();
        assert_eq!(negated.as_f64(), Some(9_223_372_036_854_775_808.0));
        assert_eq!(
            evaluator.evaluate_value("-max", &b).unwrap(),
            json!(-i64::MAX)
        );
        assert!(evaluator.evaluate_value("-big", &b).unwrap().is_f64());

        let sum = evaluator.evaluate_value("max + 1", &b).unwrap();
        assert!(sum.is_f64());
        let difference = evaluator.evaluate_value("min - 1", &b).unwrap();
        assert!(difference.is_f64());
        assert_eq!(
            evaluator.evaluate_value("max - 1", &b).unwrap(),
            json!(i64::MAX - 1)
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!(2)));
        assert!(truthy(&json!("")));
    }
}
