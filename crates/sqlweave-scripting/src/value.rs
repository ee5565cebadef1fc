//! Property-path navigation over the untyped parameter object graph
//!
//! Parameter objects are `serde_json::Value` trees. A property path such as
//! `order.lines[0].sku` walks object keys and array positions. A missing key
//! or an out-of-range index reads as `null` (map semantics); stepping into a
//! string, number or boolean is an error.

use serde_json::Value;

use crate::error::ExpressionError;

/// One step of a property path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(&'a str),
}

/// Short name of the JSON kind, used in error messages
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether the value is a scalar that can be bound directly as a parameter
pub fn is_simple(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Render a value as inline statement text. `null` renders as the empty string.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// The first segment of a property path (`a` for `a.b[0]`)
pub fn root_name(path: &str) -> &str {
    let path = path.trim();
    let end = path.find(['.', '[']).unwrap_or(path.len());
    &path[..end]
}

/// Everything after the root segment (`.b[0]` for `a.b[0]`)
pub fn path_tail(path: &str) -> &str {
    let path = path.trim();
    let root = root_name(path);
    &path[root.len()..]
}

/// Navigate a full property path starting at `root`, root segment included
pub fn property_value(root: &Value, path: &str) -> Result<Value, ExpressionError> {
    let segments = parse_segments(path.trim())?;
    walk(root, &segments)
}

/// Navigate the tail of a path (`.b[0]`, `[2].c` or empty) starting at `value`
pub fn navigate_tail(value: &Value, tail: &str) -> Result<Value, ExpressionError> {
    let tail = tail.trim();
    if tail.is_empty() {
        return Ok(value.clone());
    }
    let tail = tail.strip_prefix('.').unwrap_or(tail);
    let segments = parse_segments(tail)?;
    walk(value, &segments)
}

fn walk(root: &Value, segments: &[Segment<'_>]) -> Result<Value, ExpressionError> {
    let mut current = root;
    for segment in segments {
        current = match (current, segment) {
            (Value::Null, _) => return Ok(Value::Null),
            (Value::Object(map), Segment::Key(key)) | (Value::Object(map), Segment::Index(key)) => {
                match map.get(*key) {
                    Some(next) => next,
                    None => return Ok(Value::Null),
                }
            }
            (Value::Array(items), Segment::Index(index)) => {
                let position: usize = index.parse().map_err(|_| ExpressionError::Type {
                    message: format!("array index '{}' is not a number", index),
                })?;
                match items.get(position) {
                    Some(next) => next,
                    None => return Ok(Value::Null),
                }
            }
            (other, Segment::Key(key)) | (other, Segment::Index(key)) => {
                return Err(ExpressionError::NotNavigable {
                    segment: key.to_string(),
                    kind: kind(other),
                })
            }
        };
    }
    Ok(current.clone())
}

fn parse_segments(path: &str) -> Result<Vec<Segment<'_>>, ExpressionError> {
    let mut segments = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| ExpressionError::Syntax {
                expression: path.to_string(),
                message: "unclosed '['".to_string(),
            })?;
            let inner = after[..close].trim().trim_matches(|c| c == '\'' || c == '"');
            segments.push(Segment::Index(inner));
            rest = &after[close + 1..];
            rest = rest.strip_prefix('.').unwrap_or(rest);
            continue;
        }

        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        let key = rest[..end].trim();
        if key.is_empty() {
            return Err(ExpressionError::Syntax {
                expression: path.to_string(),
                message: "empty path segment".to_string(),
            });
        }
        segments.push(Segment::Key(key));
        rest = &rest[end..];
        rest = rest.strip_prefix('.').unwrap_or(rest);
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_property_value_nested() {
        let param = json!({"order": {"lines": [{"sku": "A-1"}, {"sku": "B-2"}]}});
        assert_eq!(
            property_value(&param, "order.lines[1].sku").unwrap(),
            json!("B-2")
        );
    }

    #[test]
    fn test_missing_key_reads_null() {
        let param = json!({"name": "x"});
        assert_eq!(property_value(&param, "age").unwrap(), Value::Null);
        assert_eq!(property_value(&param, "a.b.c").unwrap(), Value::Null);
    }

    #[test]
    fn test_scalar_is_not_navigable() {
        let param = json!({"name": "x"});
        let err = property_value(&param, "name.first").unwrap_err();
        assert!(matches!(err, ExpressionError::NotNavigable { kind: "string", .. }));
    }

    #[test]
    fn test_root_and_tail() {
        assert_eq!(root_name("__frch_item_0.name"), "__frch_item_0");
        assert_eq!(path_tail("__frch_item_0.name"), ".name");
        assert_eq!(root_name("ids[2]"), "ids");
        assert_eq!(path_tail("ids[2]"), "[2]");

        let item = json!({"name": "n"});
        assert_eq!(navigate_tail(&item, ".name").unwrap(), json!("n"));
        assert_eq!(navigate_tail(&item, "").unwrap(), item);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&Value::Null), "");
        assert_eq!(to_text(&json!("abc")), "abc");
        assert_eq!(to_text(&json!(42)), "42");
        assert_eq!(to_text(&json!(true)), "true");
    }
}
