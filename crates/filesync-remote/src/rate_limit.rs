//! Throttling support
//!
//! The remote signals overload with HTTP 429 (or 503) and an optional
//! `Retry-After` header. The client turns that into
//! `RemoteError::Throttled { retry_after }`; the scheduler then uses the
//! pause as a lower bound for the task's next backoff delay.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::warn;

/// Pause assumed when the remote throttles without a usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest pause honoured from a `Retry-After` header
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Parse a Retry-After header value into a Duration.
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2027 23:59:59 GMT"), taken relative to now
///
/// Values beyond [`MAX_RETRY_AFTER`] are clamped. Falls back to `default`
/// if parsing fails.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return match diff.to_std() {
            Ok(d) => d.min(MAX_RETRY_AFTER),
            // Date already passed
            Err(_) => Duration::ZERO,
        };
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

/// Reads the `Retry-After` header from a response, if present
pub fn retry_after_from_headers(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
