//! JSON responses on stdout.

use std::io::Write;

use serde::Serialize;
use serde_json::{json, Value};

use super::errors::{CliError, CliResult};

/// Write any serializable value as one JSON line.
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let line = serde_json::to_string(value)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", line).map_err(|e| CliError::io_error("Failed to write response", e))?;
    out.flush()
        .map_err(|e| CliError::io_error("Failed to flush response", e))
}

/// Successful response
pub fn write_response(data: Value) -> CliResult<()> {
    write_json(&data)
}

/// Error response
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_json(&error_body(code, message))
}

fn error_body(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}
