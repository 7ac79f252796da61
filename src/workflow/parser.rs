//! Reading workflow documents from JSON text.

use std::path::Path;

use serde_json::Value;

use super::types::Workflow;
use crate::error::{Error, Result};

/// Parse an export document (single or batch) into raw JSON.
///
/// The result is left untyped so it can go through
/// [`validate_export`](super::validate_export) before import.
pub fn parse_export(json: &str) -> Result<Value> {
    if json.trim().is_empty() {
        return Err(Error::Parse("Empty workflow document".to_string()));
    }

    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("Invalid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(Error::Parse(
            "Workflow document must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Parse an export document from a file path.
pub fn parse_export_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    parse_export(&content)
}

/// Parse a full (stored) workflow definition.
pub fn parse_workflow(json: &str) -> Result<Workflow> {
    if json.trim().is_empty() {
        return Err(Error::Parse("Empty workflow definition".to_string()));
    }

    serde_json::from_str(json).map_err(|e| {
        let msg = e.to_string();
        if let Some(field) = extract_missing_field(&msg) {
            Error::Parse(format!("Missing required field: {}", field))
        } else {
            Error::Parse(format!("Invalid workflow JSON: {}", msg))
        }
    })
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}
