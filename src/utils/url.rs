//! Helpers for joining the API root with request paths.

use crate::core::config::data::API_URL_KEY;
use crate::core::config::ConfigError;

/// Strips trailing slashes so paths can be appended without doubling them.
///
/// ```
/// use sessionward::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Joins the API root and a request path with exactly one slash between them.
///
/// ```
/// use sessionward::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/refresh"),
///     "https://api.example.com/v1/refresh"
/// );
/// ```
pub fn construct_api_url(base_url: &str, path: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let path = path.trim().trim_start_matches('/');
    if path.is_empty() {
        return normalized_base;
    }
    format!("{normalized_base}/{path}")
}

/// Checks that a configured API root is an absolute http(s) URL and returns
/// it normalized.
pub fn validate_base_url(base_url: &str) -> Result<String, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: API_URL_KEY.to_string(),
        message,
    };
    let normalized = normalize_base_url(base_url);
    let parsed = reqwest::Url::parse(&normalized)
        .map_err(|err| invalid(format!("invalid API URL '{base_url}': {err}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(normalized),
        "http" | "https" => Err(invalid(format!("API URL '{base_url}' has no host"))),
        other => Err(invalid(format!(
            "API URL '{base_url}' must use http or https, not {other}"
        ))),
    }
}
