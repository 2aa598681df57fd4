//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC timestamp as RFC 3339 / ISO 8601 with second precision
pub fn now_iso8601() -> String {
    now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
