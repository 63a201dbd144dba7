//! Pipeline activity counters.
//!
//! Lock-free tallies of what the pipeline has done since start-up, exposed
//! on the status endpoint and printed when a foreground feed ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current process.
#[derive(Debug)]
pub struct PipelineCounters {
    /// Readings persisted
    readings_ingested: AtomicU64,
    /// Ingestion requests rejected by validation
    readings_rejected: AtomicU64,
    /// Anomaly records written
    anomalies_recorded: AtomicU64,
    /// Successful per-recipient deliveries
    notifications_sent: AtomicU64,
    /// Breaches that did not notify because of the cooldown
    notifications_suppressed: AtomicU64,
    /// Failed per-recipient deliveries
    delivery_failures: AtomicU64,
    /// Failed mirror replications
    mirror_failures: AtomicU64,
    started_at: DateTime<Utc>,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            readings_ingested: AtomicU64::new(0),
            readings_rejected: AtomicU64::new(0),
            anomalies_recorded: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_suppressed: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            mirror_failures: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_reading(&self) {
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.anomalies_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notifications_sent(&self, count: u64) {
        self.notifications_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.notifications_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failures(&self, count: u64) {
        self.delivery_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_mirror_failure(&self) {
        self.mirror_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            readings_ingested: self.readings_ingested.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            anomalies_recorded: self.anomalies_recorded.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_suppressed: self.notifications_suppressed.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            mirror_failures: self.mirror_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Readings ingested: {}\n\
             - Readings rejected: {}\n\
             - Anomalies recorded: {}\n\
             - Notifications sent: {}\n\
             - Notifications suppressed (cooldown): {}\n\
             - Delivery failures: {}\n\
             - Mirror failures: {}\n\
             - Uptime: {} seconds",
            stats.readings_ingested,
            stats.readings_rejected,
            stats.anomalies_recorded,
            stats.notifications_sent,
            stats.notifications_suppressed,
            stats.delivery_failures,
            stats.mirror_failures,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub readings_ingested: u64,
    pub readings_rejected: u64,
    pub anomalies_recorded: u64,
    pub notifications_sent: u64,
    pub notifications_suppressed: u64,
    pub delivery_failures: u64,
    pub mirror_failures: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedCounters = Arc<PipelineCounters>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let counters = PipelineCounters::new();

        counters.record_reading();
        counters.record_reading();
        counters.record_anomaly();
        counters.record_notifications_sent(3);
        counters.record_delivery_failures(1);

        let stats = counters.snapshot();
        assert_eq!(stats.readings_ingested, 2);
        assert_eq!(stats.anomalies_recorded, 1);
        assert_eq!(stats.notifications_sent, 3);
        assert_eq!(stats.delivery_failures, 1);
        assert_eq!(stats.mirror_failures, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineCounters::new().summary();
        assert!(summary.contains("Readings ingested: 0"));
        assert!(summary.contains("suppressed (cooldown)"));
    }
}
