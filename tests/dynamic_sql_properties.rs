//! Property-based tests for statement composition and fingerprints
//!
//! These exercise the public builder API end to end:
//! - iteration synthesizes one distinct binding per element
//! - `<where>` never leaves a dangling connective
//! - `<choose>` picks the first matching branch
//! - fingerprints separate different parameter values and agree on equal ones

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use sqlweave_scripting::{ScriptBuilder, SimpleExpressionEvaluator, SqlSource};
use sqlweave_session::{statement_cache_key, MappedStatement, RowBounds, SqlCommandType};

fn build(id: &str, script: &str) -> SqlSource {
    ScriptBuilder::new(Arc::new(SimpleExpressionEvaluator::new()))
        .build(id, script)
        .unwrap()
}

fn squash(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

const BY_IDS: &str = r#"select * from blog where id in
    <foreach collection="ids" item="v" open="(" separator="," close=")">#{v}</foreach>"#;

const FILTERED: &str = r#"select * from blog
    <where>
      <if test="a != null">AND a = #{a}</if>
      <if test="b != null">OR b = #{b}</if>
      <if test="c != null">AND c = #{c}</if>
    </where>"#;

fn choose_script(branches: usize) -> String {
    let mut script = String::from("<choose>");
    for i in 0..branches {
        script.push_str(&format!(r#"<when test="f{i}">B{i}</when>"#));
    }
    script.push_str("<otherwise>D</otherwise></choose>");
    script
}

#[test]
fn test_iteration_over_three_values() {
    let source = build("blog.byIds", BY_IDS);
    let param = json!({"ids": [1, 2, 3]});
    let bound = source.bound_sql(&param).unwrap();

    assert!(bound.sql().ends_with("(?,?,?)"));
    let names: Vec<_> = bound
        .parameter_mappings()
        .iter()
        .map(|m| m.property.clone())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| bound.has_additional_parameter(n)));
    assert_ne!(names[0], names[1]);
    assert_ne!(names[1], names[2]);
    assert_eq!(bound.parameter_values().unwrap(), vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn test_first_match_never_falls_through() {
    let source = build("pick", &choose_script(3));
    let param = json!({"f0": false, "f1": false, "f2": true});
    assert_eq!(source.bound_sql(&param).unwrap().sql(), "B2");
}

#[test]
fn test_fingerprints_work_as_map_keys() {
    let ms = MappedStatement::builder("blog.byIds", build("blog.byIds", BY_IDS), SqlCommandType::Select)
        .build();
    let param = json!({"ids": [4, 5]});
    let first = statement_cache_key(&ms, &ms.bound_sql(&param).unwrap(), RowBounds::default()).unwrap();
    let second = statement_cache_key(&ms, &ms.bound_sql(&param).unwrap(), RowBounds::default()).unwrap();

    let mut results = HashMap::new();
    results.insert(first, "rows");
    assert_eq!(results.get(&second), Some(&"rows"));
}

proptest! {
    #[test]
    fn prop_iteration_binds_every_element(ids in prop::collection::vec(-10_000i64..10_000, 1..12)) {
        let source = build("blog.byIds", BY_IDS);
        let param = json!({ "ids": ids });
        let bound = source.bound_sql(&param).unwrap();

        let markers = vec!["?"; ids.len()].join(",");
        let expected_tail = format!("({})", markers);
        prop_assert!(bound.sql().ends_with(&expected_tail));
        prop_assert_eq!(bound.parameter_mappings().len(), ids.len());

        let values = bound.parameter_values().unwrap();
        let expected: Vec<Value> = ids.iter().map(|id| json!(id)).collect();
        prop_assert_eq!(values, expected);
    }

    #[test]
    fn prop_where_never_dangles(
        a in proptest::option::of(0i64..100),
        b in proptest::option::of(0i64..100),
        c in proptest::option::of(0i64..100),
    ) {
        let source = build("blog.filtered", FILTERED);
        let param = json!({ "a": a, "b": b, "c": c });
        let sql = squash(source.bound_sql(&param).unwrap().sql());
        let present = [a, b, c].iter().filter(|v| v.is_some()).count();

        prop_assert!(!sql.contains("WHERE AND"));
        prop_assert!(!sql.contains("WHERE OR"));
        prop_assert_eq!(sql.matches('?').count(), present);
        if present == 0 {
            prop_assert_eq!(sql, "select * from blog");
        } else {
            prop_assert!(sql.starts_with("select * from blog WHERE "));
        }
    }

    #[test]
    fn prop_choose_takes_first_true(flags in prop::collection::vec(any::<bool>(), 1..6)) {
        let source = build("pick", &choose_script(flags.len()));
        let mut param = serde_json::Map::new();
        for (i, flag) in flags.iter().enumerate() {
            param.insert(format!("f{}", i), json!(flag));
        }
        let param = Value::Object(param);
        let sql = source.bound_sql(&param).unwrap().sql().to_string();

        let expected = match flags.iter().position(|f| *f) {
            Some(i) => format!("B{}", i),
            None => "D".to_string(),
        };
        prop_assert_eq!(sql, expected);
    }

    #[test]
    fn prop_fingerprint_tracks_parameter_values(
        left in prop::collection::vec(-1000i64..1000, 1..6),
        right in prop::collection::vec(-1000i64..1000, 1..6),
    ) {
        let ms = MappedStatement::builder("blog.byIds", build("blog.byIds", BY_IDS), SqlCommandType::Select)
            .build();
        let left_param = json!({ "ids": left });
        let right_param = json!({ "ids": right });
        let left_bound = ms.bound_sql(&left_param).unwrap();
        let right_bound = ms.bound_sql(&right_param).unwrap();
        let left_key = statement_cache_key(&ms, &left_bound, RowBounds::default()).unwrap();
        let right_key = statement_cache_key(&ms, &right_bound, RowBounds::default()).unwrap();

        if left == right {
            prop_assert_eq!(left_key.hashcode(), right_key.hashcode());
            prop_assert_eq!(left_key, right_key);
        } else {
            prop_assert_ne!(left_key, right_key);
        }
    }
}
