//! Timestamp unit normalization and display.

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;

/// Magnitude above which a timestamp is taken to be in milliseconds.
///
/// 1e11 seconds is in the year 5138, while 1e11 milliseconds is early 1973.
pub const MILLIS_CUTOFF: f64 = 1e11;

/// Canonicalize a timestamp to seconds.
pub fn normalize(ts: f64) -> f64 {
    if ts > MILLIS_CUTOFF {
        ts / 1000.0
    } else {
        ts
    }
}

/// Current wall-clock time in seconds.
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Render a timestamp as local wall time in `tz`.
pub fn format_local(ts: f64, tz: Tz) -> String {
    let secs = normalize(ts);
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    match Utc.timestamp_opt(whole as i64, nanos).single() {
        Some(utc) => utc
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        None => format!("{secs:.3}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_seconds_unchanged() {
        assert_eq!(normalize(1_700_000_000.0), 1_700_000_000.0);
        assert_eq!(normalize(0.0), 0.0);
        assert_eq!(normalize(-5.0), -5.0);
        assert_eq!(normalize(MILLIS_CUTOFF), MILLIS_CUTOFF);
    }

    #[test]
    fn test_normalize_millis() {
        assert_eq!(normalize(1_700_000_000_000.0), 1_700_000_000.0);
        assert_eq!(normalize(1_700_000_000_500.0), 1_700_000_000.5);
    }

    #[test]
    fn test_normalize_idempotent() {
        for ts in [0.0, 1.5, 1_700_000_000.0, 1_700_000_000_123.0] {
            let once = normalize(ts);
            assert_eq!(normalize(once), once);
        }
    }

    #[test]
    fn test_format_local() {
        assert_eq!(format_local(0.0, chrono_tz::UTC), "1970-01-01 00:00:00 UTC");
        // Millisecond input renders the same instant
        assert_eq!(
            format_local(1_000.0 * 3_600.0 * 1_000_000.0, chrono_tz::UTC),
            format_local(3_600.0 * 1_000_000.0, chrono_tz::UTC)
        );
        let rome = format_local(0.0, chrono_tz::Europe::Rome);
        assert!(rome.starts_with("1970-01-01 01:00:00"));
    }
}
