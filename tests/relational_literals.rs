use keyfolder::datatype::{SqlType, literal, quote};
use keyfolder::field::{Field, FieldOptions};
use serde_json::json;

#[test]
fn literals_escape_single_quotes() {
    assert_eq!(quote("O'Brien"), "'O''Brien'");
    assert_eq!(literal(&json!("O'Brien")), "'O''Brien'");
    assert_eq!(literal(&json!(null)), "null");
    assert_eq!(literal(&json!(5)), "5");
    assert_eq!(literal(&json!(true)), "true");
    assert_eq!(literal(&json!(["it's"])), r#"'["it''s"]'"#);
    assert_eq!(literal(&json!({ "a": 1 })), r#"'{"a":1}'"#);
}

#[test]
fn default_fragments_follow_the_literal_rules() {
    let name = Field::new("owner.name", FieldOptions::new("string").default_value("O'Brien")).expect("field");
    assert_eq!(name.default_of(true).fragment.as_deref(), Some("'owner.name' = 'O''Brien'"));

    let unset = Field::new("owner.nick", FieldOptions::new("string")).expect("field");
    assert_eq!(unset.default_of(true).fragment.as_deref(), Some("'owner.nick' = null"));

    let count = Field::new("count", FieldOptions::new("integer").default_value(5)).expect("field");
    let parsed = count.default_of(true);
    assert_eq!(parsed.data, json!(5));
    assert_eq!(parsed.fragment.as_deref(), Some("'count' = 5"));
}

#[test]
fn fragments_are_absent_without_a_relational_store() {
    let count = Field::new("count", FieldOptions::new("integer").default_value(5)).expect("field");
    let parsed = count.default_of(false);
    assert_eq!(parsed.data, json!(5));
    assert!(parsed.fragment.is_none());
}

#[test]
fn column_definitions_carry_sql_type_and_default() {
    assert_eq!(SqlType::for_kind("integer"), SqlType::Integer);
    assert_eq!(SqlType::for_kind("float"), SqlType::Integer);
    assert_eq!(SqlType::for_kind("user"), SqlType::Text);

    let count = Field::new("stats.count", FieldOptions::new("integer").default_value(5)).expect("field");
    assert_eq!(count.relational_column(), &("stats.count".to_string(), "INTEGER DEFAULT 5".to_string()));

    let nick = Field::new("nick", FieldOptions::new("string")).expect("field");
    assert_eq!(nick.relational_column().1, "TEXT");

    let quoted = Field::new("greeting", FieldOptions::new("string").default_value("it's")).expect("field");
    assert_eq!(quoted.relational_column().1, "TEXT DEFAULT 'it''s'");

    let roles = Field::new("roles", FieldOptions::new("role").array(true)).expect("field");
    assert_eq!(roles.relational_column().1, "TEXT DEFAULT '[]'");

    let flag = Field::new("flag", FieldOptions::new("boolean")).expect("field");
    assert_eq!(flag.relational_column().1, "TEXT DEFAULT false");
}
