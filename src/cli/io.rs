//! JSON I/O handling for CLI
//!
//! - Output: one JSON object per command on stdout
//! - Row arguments: one JSON object per argument
//! - UTF-8 only

use std::io::{self, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::rows::Row;

/// Parses a row argument, which must be a JSON object.
pub fn parse_row(raw: &str) -> CliResult<Row> {
    if raw.trim().is_empty() {
        return Err(CliError::invalid_argument("Empty row JSON"));
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::invalid_argument(format!(
            "Row must be a JSON object, got {}",
            other
        ))),
    }
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}
