//! Epoch-millisecond helpers. All stored timestamps are epoch millis.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{CurationError, Result};

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// RFC 3339 in UTC with millisecond precision, e.g. `2024-01-02T03:04:05.006Z`.
pub fn millis_to_rfc3339(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => millis.to_string(),
    }
}

/// Accepts epoch millis or an RFC 3339 / `YYYY-MM-DD` date (midnight UTC).
pub fn parse_millis(input: &str) -> Result<i64> {
    let input = input.trim();
    if let Ok(millis) = input.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    Err(CurationError::InvalidTimestamp(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_millis() {
        assert_eq!(millis_to_rfc3339(1_704_164_645_006), "2024-01-02T03:04:05.006Z");
    }

    #[test]
    fn test_parse_millis_forms() {
        assert_eq!(parse_millis("1704164645006").unwrap(), 1_704_164_645_006);
        assert_eq!(parse_millis("2024-01-02T03:04:05.006Z").unwrap(), 1_704_164_645_006);
        assert_eq!(parse_millis("2024-01-02").unwrap(), 1_704_153_600_000);
        assert!(parse_millis("yesterday").is_err());
    }
}
