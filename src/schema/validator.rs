//! Value validator
//!
//! Checks a candidate cell value against its column definition and returns the
//! value in the form it is stored. Pure: no storage access, no mutation.
//!
//! - JSON `null` clears the cell for every type
//! - No implicit coercion of strings into numbers or booleans
//! - Tag values are normalized, vocabulary-checked, deduplicated and sorted

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::errors::{SchemaError, SchemaResult};
use super::naming::normalize_name;
use super::types::{ColumnDef, ColumnType};
use crate::storage::SqlValue;

/// Structured value stored in `link` columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub url: String,
}

const MAX_RATING: i64 = 5;
const MAX_ADVANCED_RATING: f64 = 10.0;

/// Validates `value` for `column`, returning the value to store.
///
/// # Errors
///
/// - Validation when the value has the wrong shape or range, when a tag is
///   not in the vocabulary, or when the custom rule does not compile or match
/// - Invariant when the column's extras do not belong to its type
pub fn validate(column: &ColumnDef, value: &Value) -> SchemaResult<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let name = column.name.as_str();

    match column.column_type {
        ColumnType::String | ColumnType::RichText => value
            .as_str()
            .map(SqlValue::from)
            .ok_or_else(|| type_error(name, "a string", value)),
        // JSON booleans are typed values, stored as 0/1 like the integers.
        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            _ => match value.as_i64() {
                Some(v @ (0 | 1)) => Ok(SqlValue::Integer(v)),
                _ => Err(type_error(name, "exactly 0 or 1", value)),
            },
        },
        ColumnType::Integer => value
            .as_i64()
            .map(SqlValue::Integer)
            .ok_or_else(|| type_error(name, "an integer", value)),
        ColumnType::Float => value
            .as_f64()
            .map(SqlValue::Real)
            .ok_or_else(|| type_error(name, "a number", value)),
        ColumnType::Date => validate_date(name, value),
        ColumnType::Rating => match value.as_i64() {
            Some(v) if (0..=MAX_RATING).contains(&v) => Ok(SqlValue::Integer(v)),
            _ => Err(type_error(name, "an integer between 0 and 5", value)),
        },
        ColumnType::AdvancedRating => match value.as_f64() {
            Some(v) if (0.0..=MAX_ADVANCED_RATING).contains(&v) => Ok(SqlValue::Real(v)),
            _ => Err(type_error(name, "a number between 0.0 and 10.0", value)),
        },
        ColumnType::SingleTag | ColumnType::MultiTag => validate_tags(column, value),
        ColumnType::Custom => validate_custom(column, value),
        ColumnType::Link => validate_link(name, value),
    }
}

fn validate_date(name: &str, value: &Value) -> SchemaResult<SqlValue> {
    let millis = match value.as_i64() {
        Some(v) => Some(v),
        None => value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f <= i64::MAX as f64)
            .map(|f| f as i64),
    };
    match millis {
        Some(v) if v > 0 => Ok(SqlValue::Integer(v)),
        _ => Err(type_error(name, "a positive epoch-millisecond number", value)),
    }
}

fn validate_tags(column: &ColumnDef, value: &Value) -> SchemaResult<SqlValue> {
    let vocabulary = column.tags().ok_or_else(|| {
        SchemaError::invariant(&column.name, "tag column carries no tag vocabulary")
    })?;

    let raw: Vec<String> = match value {
        Value::String(s) => s.split_whitespace().map(normalize_name).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(normalize_name)
                    .ok_or_else(|| type_error(&column.name, "a list of tag names", value))
            })
            .collect::<SchemaResult<_>>()?,
        _ => return Err(type_error(&column.name, "tag names", value)),
    };

    let mut tokens = BTreeSet::new();
    for token in raw.into_iter().filter(|t| !t.is_empty()) {
        if !vocabulary.contains_key(&token) {
            return Err(SchemaError::validation(
                &column.name,
                format!("tag '{}' is not registered", token),
            ));
        }
        tokens.insert(token);
    }

    if column.column_type == ColumnType::SingleTag && tokens.len() > 1 {
        return Err(SchemaError::validation(
            &column.name,
            format!("expected at most one tag, got {}", tokens.len()),
        ));
    }
    if tokens.is_empty() {
        return Ok(SqlValue::Null);
    }
    Ok(SqlValue::Text(tokens.into_iter().collect::<Vec<_>>().join(" ")))
}

fn validate_custom(column: &ColumnDef, value: &Value) -> SchemaResult<SqlValue> {
    let text = value
        .as_str()
        .ok_or_else(|| type_error(&column.name, "a string", value))?;
    if let Some(rule) = column.rule() {
        let pattern =
            Regex::new(rule).map_err(|e| SchemaError::invalid_rule(&column.name, rule, e))?;
        if !pattern.is_match(text) {
            return Err(SchemaError::validation(
                &column.name,
                format!("value '{}' does not match rule '{}'", text, rule),
            ));
        }
    }
    Ok(SqlValue::from(text))
}

fn validate_link(name: &str, value: &Value) -> SchemaResult<SqlValue> {
    let link = parse_link(value).ok_or_else(|| {
        SchemaError::validation(name, "expected a link {\"displayName\": .., \"url\": ..}")
    })?;
    serde_json::to_string(&link)
        .map(SqlValue::Text)
        .map_err(|e| SchemaError::invariant(name, format!("link serialization failed: {}", e)))
}

/// Accepts a JSON-encoded string or an object; anything else is `None`.
fn parse_link(value: &Value) -> Option<Link> {
    let link: Link = match value {
        Value::String(s) => serde_json::from_str(s).ok()?,
        Value::Object(_) => serde_json::from_value(value.clone()).ok()?,
        _ => return None,
    };
    if link.display_name.trim().is_empty() {
        return None;
    }
    Some(link)
}

/// Decodes a stored link cell back into its object form.
pub fn decode_link(stored: &str) -> Option<Value> {
    serde_json::from_str::<Link>(stored)
        .ok()
        .and_then(|link| serde_json::to_value(link).ok())
}

/// Returns the JSON type name for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(column: &str, expected: &str, actual: &Value) -> SchemaError {
    let shown = match actual {
        Value::Number(n) => n.to_string(),
        other => json_type_name(other).to_string(),
    };
    SchemaError::validation(column, format!("expected {}, got {}", expected, shown))
}
