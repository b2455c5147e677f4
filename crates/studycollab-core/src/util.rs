//! Shared utility functions used across multiple modules.

use serde_json::Value;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Read a row's `updated_at` as Unix milliseconds.
///
/// Accepts integer milliseconds or RFC 3339 strings (as returned by Postgres).
pub fn updated_at_millis(value: &Value) -> Option<i64> {
    match value.get("updated_at")? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => chrono::DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|date_time| date_time.timestamp_millis()),
        _ => None,
    }
}

/// Read a row's `id` as a string, accepting string or numeric ids.
pub fn record_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) => normalize_text_option(Some(id.clone())),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Format Unix milliseconds as an RFC 3339 UTC timestamp.
pub fn millis_to_rfc3339(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    )
}
