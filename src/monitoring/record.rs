//! Access log record parsing
//!
//! Lines are JSON objects written by the reverse proxy. Anything that does not
//! start with `{` is skipped, so plain-text lines interleaved in the stream are
//! harmless. Every field is optional and may be a string, a number, or `null`.

use crate::monitoring::pool::{self, PLACEHOLDER};
use crate::utils::AppError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Display value for a missing request timestamp
pub const UNKNOWN_TIME: &str = "unknown";

/// Parsed access log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub method: String,
    pub uri: String,
    /// Status returned to the client
    pub status: String,
    pub time: String,
    /// Upstream address field; empty, `-`, or a comma-separated list
    pub upstream: String,
    /// One status per attempted upstream; empty, `-`, or a comma-separated list
    pub upstream_status: String,
}

impl LogRecord {
    /// Whether any attempted upstream answered with a 5xx
    pub fn is_error(&self) -> bool {
        is_error_status(&self.upstream_status)
    }

    /// Whether the proxy tried more than one upstream for this request
    pub fn is_failover_attempt(&self) -> bool {
        pool::is_failover_attempt(&self.upstream)
    }
}

/// Result of parsing one raw line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Record(LogRecord),
    /// Blank or non-structured line
    Skip,
}

/// Internal structure for JSON log parsing
#[derive(Debug, Deserialize)]
struct RawAccessLog {
    #[serde(default, deserialize_with = "lenient_string")]
    method: String,
    #[serde(default, deserialize_with = "lenient_string")]
    uri: String,
    #[serde(default, deserialize_with = "lenient_string")]
    status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pool: String,
    #[serde(default, deserialize_with = "lenient_string")]
    upstream_addr: String,
    #[serde(default, deserialize_with = "lenient_string")]
    upstream_status: String,
}

/// Accept strings, numbers, and booleans as text; anything else becomes empty
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

fn or_default(value: String, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == PLACEHOLDER {
        default.to_string()
    } else {
        value
    }
}

/// Parse one raw log line
pub fn parse_line(line: &str) -> Result<ParsedLine, AppError> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return Ok(ParsedLine::Skip);
    }

    let raw: RawAccessLog =
        serde_json::from_str(trimmed).map_err(|e| AppError::malformed_record(e.to_string()))?;

    // `pool` wins over `upstream_addr` unless it is empty
    let upstream = if raw.pool.trim().is_empty() {
        raw.upstream_addr
    } else {
        raw.pool
    };

    Ok(ParsedLine::Record(LogRecord {
        method: or_default(raw.method, PLACEHOLDER),
        uri: or_default(raw.uri, PLACEHOLDER),
        status: or_default(raw.status, PLACEHOLDER),
        time: or_default(raw.time, UNKNOWN_TIME),
        upstream,
        upstream_status: raw.upstream_status.trim().to_string(),
    }))
}

/// Classify an upstream status field
///
/// Empty or placeholder means no upstream answered, which is not counted as an
/// error. Otherwise the request is an error if any attempt returned 5xx.
/// Empty and non-numeric tokens are treated as non-errors.
pub fn is_error_status(upstream_status: &str) -> bool {
    let trimmed = upstream_status.trim();
    if trimmed.is_empty() || trimmed == PLACEHOLDER {
        return false;
    }
    trimmed
        .split(',')
        .map(str::trim)
        .any(|status| status.starts_with('5'))
}
