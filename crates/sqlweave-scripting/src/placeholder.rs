//! `#{...}` placeholder parsing
//!
//! Turns composed statement text into the final text with `?` markers plus
//! the ordered parameter descriptors. Placeholder content grammar:
//!
//! ```text
//! #{property[:JDBCTYPE][,attribute=value]*}
//! ```
//!
//! Supported attributes: `javaType`, `jdbcType`, `jdbcTypeName`, `mode`,
//! `numericScale`, `resultMap`, `typeHandler`, `property`.

use crate::error::{Result, ScriptError};
use crate::mapping::ParameterMapping;
use crate::token::parse_tokens;

/// Parse every `#{...}` placeholder of `sql`
pub fn parse_placeholders(sql: &str) -> Result<(String, Vec<ParameterMapping>)> {
    let mut mappings = Vec::new();
    let text = parse_tokens(sql, "#{", "}", |content| {
        mappings.push(parse_parameter(content)?);
        Ok::<_, ScriptError>("?".to_string())
    })?;
    Ok((text, mappings))
}

/// Parse the content of a single placeholder
pub fn parse_parameter(content: &str) -> Result<ParameterMapping> {
    let invalid = |message: String| ScriptError::Placeholder {
        content: content.to_string(),
        message,
    };

    let trimmed = content.trim();
    if trimmed.starts_with('(') {
        return Err(invalid(
            "expression based parameters are not supported".to_string(),
        ));
    }

    let (head, attributes) = match trimmed.find(',') {
        Some(comma) => (&trimmed[..comma], &trimmed[comma + 1..]),
        None => (trimmed, ""),
    };
    let (property, inline_jdbc_type) = match head.find(':') {
        Some(colon) => (head[..colon].trim(), Some(head[colon + 1..].trim())),
        None => (head.trim(), None),
    };
    if property.is_empty() {
        return Err(invalid("missing property name".to_string()));
    }

    let mut mapping = ParameterMapping::new(property);
    if let Some(jdbc_type) = inline_jdbc_type {
        mapping.jdbc_type = Some(jdbc_type.parse().map_err(invalid)?);
    }

    for attribute in attributes.split(',').filter(|a| !a.trim().is_empty()) {
        let (name, value) = attribute
            .split_once('=')
            .map(|(n, v)| (n.trim(), v.trim()))
            .ok_or_else(|| invalid(format!("attribute '{}' has no value", attribute.trim())))?;

        match name {
            "javaType" => mapping.java_type = Some(value.to_string()),
            "jdbcType" => mapping.jdbc_type = Some(value.parse().map_err(invalid)?),
            "jdbcTypeName" => mapping.jdbc_type_name = Some(value.to_string()),
            "mode" => mapping.mode = value.parse().map_err(invalid)?,
            "numericScale" => {
                mapping.numeric_scale = Some(value.parse().map_err(|_| {
                    invalid(format!("numericScale '{}' is not a number", value))
                })?)
            }
            "resultMap" => mapping.result_map = Some(value.to_string()),
            "typeHandler" => mapping.type_handler = Some(value.to_string()),
            "property" => mapping.property = value.to_string(),
            other => {
                return Err(invalid(format!(
                    "unknown attribute '{}'; valid attributes are javaType, jdbcType, mode, \
                     numericScale, resultMap, typeHandler, jdbcTypeName",
                    other
                )))
            }
        }
    }

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{JdbcType, ParameterMode};

    #[test]
    fn test_markers_match_mappings() {
        let (sql, mappings) =
            parse_placeholders("select * from t where a = #{a} and b = #{b.c}").unwrap();
        assert_eq!(sql, "select * from t where a = ? and b = ?");
        assert_eq!(sql.matches('?').count(), mappings.len());
        assert_eq!(mappings[0].property, "a");
        assert_eq!(mappings[1].property, "b.c");
    }

    #[test]
    fn test_attributes() {
        let mapping = parse_parameter(
            " price , javaType=decimal, jdbcType=NUMERIC, numericScale=2, mode=INOUT ",
        )
        .unwrap();
        assert_eq!(mapping.property, "price");
        assert_eq!(mapping.java_type.as_deref(), Some("decimal"));
        assert_eq!(mapping.jdbc_type, Some(JdbcType::Numeric));
        assert_eq!(mapping.numeric_scale, Some(2));
        assert_eq!(mapping.mode, ParameterMode::InOut);
    }

    #[test]
    fn test_inline_jdbc_type() {
        let mapping = parse_parameter("name:VARCHAR").unwrap();
        assert_eq!(mapping.property, "name");
        assert_eq!(mapping.jdbc_type, Some(JdbcType::Varchar));
    }

    #[test]
    fn test_invalid_placeholders() {
        assert!(parse_parameter("a, colour=red").is_err());
        assert!(parse_parameter("a, mode=SIDEWAYS").is_err());
        let err = parse_parameter("(a + 1)").unwrap_err();
        assert!(err.to_string().contains("expression based parameters"));
        assert!(parse_parameter(" (a), jdbcType=INTEGER").is_err());
        assert!(parse_parameter("  ").is_err());
        assert!(parse_parameter("a, numericScale=x").is_err());
    }
}
