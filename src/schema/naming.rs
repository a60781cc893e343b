//! Identifier normalization
//!
//! Every user-supplied database, table, column and tag name passes through
//! [`normalize_name`] before it is compared or stored.

use super::errors::{SchemaError, SchemaResult};

/// Trims, lower-cases and collapses internal whitespace runs into a single `_`.
///
/// Idempotent: `normalize_name(&normalize_name(x)) == normalize_name(x)`.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalizes `raw` and rejects names that are empty afterwards.
pub fn checked_name(kind: &str, raw: &str) -> SchemaResult<String> {
    let name = normalize_name(raw);
    if name.is_empty() {
        return Err(SchemaError::validation(kind, "name is empty"));
    }
    Ok(name)
}

/// Like [`checked_name`], but the result also names a file on disk, so path
/// separators and a leading dot are rejected.
pub fn checked_database_id(raw: &str) -> SchemaResult<String> {
    let id = checked_name("database", raw)?;
    if id.starts_with('.') || id.contains(&['/', '\\', '\0'][..]) {
        return Err(SchemaError::validation(
            id,
            "database name must not contain path separators or start with '.'",
        ));
    }
    Ok(id)
}

/// Quotes an identifier for inclusion in SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_name("  Due Date "), "due_date");
        assert_eq!(normalize_name("Read\t\tNext  Week"), "read_next_week");
        assert_eq!(normalize_name("RATING"), "rating");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in ["  A  b ", "x", "Already_Normal", "Ünïcode Name", "a\nb\tc", ""] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn test_checked_names() {
        assert_eq!(checked_name("table", " My Books ").unwrap(), "my_books");
        assert!(checked_name("table", " \t ").is_err());
        assert_eq!(checked_database_id("Library").unwrap(), "library");
        assert!(checked_database_id("../etc").is_err());
        assert!(checked_database_id("a/b").is_err());
        assert!(checked_database_id(".hidden").is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("title"), "\"title\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
