//! Field-level validation messages for request bodies and filters.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NOT_AN_INTEGER: &str = "A valid integer is required.";
pub const NOT_NULL: &str = "This field may not be null.";

/// Messages keyed by field name, rendered as `{"field": ["msg", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

/// Rules for one text field.
#[derive(Clone, Copy, Debug)]
pub struct TextRule {
    pub required: bool,
    pub max_len: Option<usize>,
}

impl TextRule {
    pub const fn required(max_len: Option<usize>) -> Self {
        Self {
            required: true,
            max_len,
        }
    }
}

/// Check a text value against `rule`. Blank values are always rejected.
/// With `partial` (PATCH), an absent value is never an error.
pub fn check_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    rule: TextRule,
    partial: bool,
) {
    match value {
        None if rule.required && !partial => errors.add(field, REQUIRED),
        None => {}
        Some(v) if v.trim().is_empty() => errors.add(field, BLANK),
        Some(v) => {
            if let Some(max) = rule.max_len {
                if v.chars().count() > max {
                    errors.add(
                        field,
                        format!("Ensure this field has no more than {} characters.", max),
                    );
                }
            }
        }
    }
}

/// Parse an id-valued query filter. Empty strings mean "no filter".
pub fn parse_id_filter(errors: &mut FieldErrors, field: &str, raw: Option<&str>) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, NOT_AN_INTEGER);
            None
        }
    }
}

/// Read a primary key sent as a JSON number or a numeric string.
pub fn parse_pk(errors: &mut FieldErrors, field: &str, raw: &Value) -> Option<i64> {
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        errors.add(
            field,
            format!("Incorrect type. Expected pk value, received {}.", json_type(raw)),
        );
    }
    parsed
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_field_missing_on_full_write() {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "name", None, TextRule::required(Some(200)), false);
        assert_eq!(errors.get("name"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn partial_write_skips_absent_fields() {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "name", None, TextRule::required(Some(200)), true);
        assert!(errors.is_empty());
    }

    #[test]
    fn blank_and_too_long_are_reported() {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "title", Some("  "), TextRule::required(None), false);
        let long = "x".repeat(201);
        check_text(&mut errors, "name", Some(&long), TextRule::required(Some(200)), false);
        assert_eq!(errors.get("title"), Some(&[BLANK.to_string()][..]));
        assert_eq!(
            errors.get("name").unwrap()[0],
            "Ensure this field has no more than 200 characters."
        );
    }

    #[test]
    fn id_filters_ignore_empty_and_reject_garbage() {
        let mut errors = FieldErrors::new();
        assert_eq!(parse_id_filter(&mut errors, "project", Some("")), None);
        assert_eq!(parse_id_filter(&mut errors, "project", Some("12")), Some(12));
        assert!(errors.is_empty());
        assert_eq!(parse_id_filter(&mut errors, "project", Some("abc")), None);
        assert_eq!(errors.get("project"), Some(&[NOT_AN_INTEGER.to_string()][..]));
    }

    #[test]
    fn pks_accept_numbers_and_numeric_strings() {
        let mut errors = FieldErrors::new();
        assert_eq!(parse_pk(&mut errors, "project", &serde_json::json!(3)), Some(3));
        assert_eq!(parse_pk(&mut errors, "project", &serde_json::json!(" 12 ")), Some(12));
        assert!(errors.is_empty());

        assert_eq!(parse_pk(&mut errors, "assigned_to", &serde_json::json!("abc")), None);
        assert_eq!(parse_pk(&mut errors, "project", &serde_json::json!(1.5)), None);
        assert_eq!(
            errors.get("assigned_to"),
            Some(&["Incorrect type. Expected pk value, received str.".to_string()][..])
        );
        assert_eq!(
            errors.get("project"),
            Some(&["Incorrect type. Expected pk value, received float.".to_string()][..])
        );
    }

    #[test]
    fn serializes_as_plain_map() {
        let errors = FieldErrors::single("bug_id", "bug_id is required");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({"bug_id": ["bug_id is required"]}));
    }
}
