//! Timeout literal parsing.

use std::time::Duration;

/// Parse a timeout literal: `30s`, `30` (seconds), `2m`, `5000ms`.
///
/// Returns `None` for malformed or non-positive input.
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => s.split_at(idx),
        None => (s.as_str(), ""),
    };
    let value: f64 = digits.parse().ok()?;
    if value <= 0.0 || !value.is_finite() {
        return None;
    }

    let millis = match unit {
        "" | "s" | "sec" | "secs" => value * 1000.0,
        "ms" => value,
        "m" | "min" | "mins" => value * 60.0 * 1000.0,
        "h" => value * 3600.0 * 1000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis.round() as u64))
}
