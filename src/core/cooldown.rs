//! Notification cooldown gate.
//!
//! The gate owns no state: the caller passes the timestamp of the last
//! persisted anomaly for the same (subject, sensor) pair.

use crate::core::time::normalize;

/// Default minimum spacing between two alerts for the same pair.
pub const DEFAULT_COOLDOWN_SECS: u64 = 900;

/// Decide whether a breach at `current` may notify again.
///
/// Both inputs may be in seconds or milliseconds.
pub fn should_notify(previous: Option<f64>, current: f64, cooldown_secs: u64) -> bool {
    match previous {
        None => true,
        Some(prev) => normalize(current) - normalize(prev) >= cooldown_secs as f64,
    }
}
