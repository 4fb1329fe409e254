//! Environment variable names used by this crate for convenient
//! configuration of the formatter and layer from services.
//!
//! These are purely helpers; the core formatter and filter types remain
//! decoupled from environment access.

use crate::error::ConfigError;

/// Spaces of indentation for pretty-printed records. Unset means single-line.
pub const JSON_LOG_INDENT_ENV: &str = "JSON_LOG_INDENT";

/// `true` to render `timestamp` in UTC instead of local time.
pub const JSON_LOG_UTC_ENV: &str = "JSON_LOG_UTC";

/// strftime layout for `timestamp`.
pub const JSON_LOG_DATE_FORMAT_ENV: &str = "JSON_LOG_DATE_FORMAT";

/// Least severe level recorded by the layer, e.g. `info`.
pub const JSON_LOG_LEVEL_ENV: &str = "JSON_LOG_LEVEL";

/// Value reported as `processName`.
pub const JSON_LOG_PROCESS_NAME_ENV: &str = "JSON_LOG_PROCESS_NAME";

/// `true` to also print human-readable lines through `tracing_subscriber::fmt`.
pub const JSON_LOG_HUMAN_READABLE_ENV: &str = "JSON_LOG_HUMAN_READABLE";

/// Deployment environment name included in JSON access logs.
pub const ENVIRONMENT_ENV: &str = "ENVIRONMENT";

/// Read an optional environment variable, treating empty values as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean flag such as `1`, `true`, `yes`, `on` (or their negations).
pub fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { key: key.to_string(), value: value.to_string() }),
    }
}
