// Argument validation and error classification for the command line

use crate::engine::EngineError;

/// Whether an error should be reported as an internal failure (exit code 2)
/// rather than a user error (exit code 1).
///
/// Engine rejections and argument problems are user errors; storage failures
/// surfacing from SQLite are internal.
pub fn is_internal_error(err: &anyhow::Error) -> bool {
    if let Some(engine) = err.downcast_ref::<EngineError>() {
        return !engine.is_user_error();
    }
    err.chain()
        .any(|cause| cause.downcast_ref::<rusqlite::Error>().is_some())
}

/// Validate that a string is not empty
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", field_name))
    } else {
        Ok(())
    }
}

/// Validate that a lot ID is valid (positive integer)
pub fn validate_lot_id(id_str: &str) -> Result<i64, String> {
    id_str.trim().parse::<i64>()
        .map_err(|_| format!("Invalid lot ID: '{}'. Lot ID must be a number.", id_str))
        .and_then(|id| {
            if id > 0 {
                Ok(id)
            } else {
                Err(format!("Invalid lot ID: {}. Lot ID must be positive.", id))
            }
        })
}

/// Parse a quantity argument. Range checks against the lot happen in the engine.
pub fn parse_quantity(qty_str: &str) -> Result<i64, String> {
    qty_str.trim().parse::<i64>()
        .map_err(|_| format!("Invalid quantity: '{}'. Quantity must be a whole number.", qty_str))
}

/// Parse an on/off style flag value
pub fn parse_flag_value(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "on" | "yes" | "true" => Ok(true),
        "0" | "off" | "no" | "false" => Ok(false),
        other => Err(format!("Invalid flag value: '{}'. Use 1/0, on/off or yes/no.", other)),
    }
}

/// Parse a `key=value` specification attribute
pub fn parse_attr(attr: &str) -> Result<(String, String), String> {
    let Some((key, value)) = attr.split_once('=') else {
        return Err(format!("Invalid attribute: '{}'. Expected key=value.", attr));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err("Attribute key cannot be empty".to_string());
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(format!(
            "Invalid attribute key: '{}'. Keys can only contain letters, numbers, underscores, hyphens, and dots.",
            key
        ));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
