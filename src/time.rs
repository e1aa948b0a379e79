//! `created_at` is stored as milliseconds since the Unix epoch, UTC.

use chrono::{DateTime, Utc};

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Current time as a `created_at` value.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Out-of-range values read back as the epoch.
pub fn created_at_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Minute-precision UTC rendering used when printing a list.
pub fn format_created_at(ms: i64) -> String {
    created_at_to_utc(ms).format(CREATED_AT_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_prints_to_the_minute() {
        // 2024-03-09 14:27:59.999 UTC
        assert_eq!(format_created_at(1_709_994_479_999), "2024-03-09 14:27");
    }

    #[test]
    fn corrupt_created_at_prints_as_epoch() {
        assert_eq!(format_created_at(i64::MAX), "1970-01-01 00:00");
    }

    #[test]
    fn fresh_timestamps_round_trip_through_utc() {
        let stamp = now_ms();
        assert_eq!(created_at_to_utc(stamp).timestamp_millis(), stamp);
    }
}
