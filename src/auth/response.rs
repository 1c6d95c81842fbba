use crate::auth::error::ApiError;
use reqwest::StatusCode;
use serde_json::Value;

const ERROR_MESSAGE_FIELDS: &[&str] = &["detail", "message", "error"];

/// Turns a finished response into its parsed body, or `RequestFailed` for any
/// non-success status.
pub(crate) async fn read_response(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message =
            extract_error_message(&text).unwrap_or_else(|| generic_failure_message(status));
        return Err(ApiError::RequestFailed { status, message });
    }

    Ok(parse_body(&text))
}

/// Empty bodies parse as `null`; bodies that are not JSON come back as a
/// string.
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Pulls a human readable message out of a JSON error body.
pub fn extract_error_message(text: &str) -> Option<String> {
    let body: Value = serde_json::from_str(text).ok()?;
    ERROR_MESSAGE_FIELDS.iter().find_map(|field| {
        match body.get(*field)? {
            Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
            Value::Null => None,
            Value::String(_) => None,
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            other => Some(other.to_string()),
        }
    })
}

pub fn generic_failure_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("Request failed with status {} {reason}", status.as_u16()),
        None => format!("Request failed with status {}", status.as_u16()),
    }
}
