//! Persistence interfaces for readings and anomalies.
//!
//! Implementations must serialize writes through a single point and keep
//! `(subject, sensor)` partitions ordered by timestamp. Ties are broken by
//! insertion order.

pub mod memory;
pub mod sqlite;

use crate::core::types::{Anomaly, Order, Reading, SensorKind};
use crate::error::StoreError;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Append-only reading persistence.
pub trait ReadingStore: Send + Sync {
    /// Persist a reading and return its row id.
    fn write_reading(&self, reading: &Reading) -> Result<i64, StoreError>;

    /// Up to `limit` readings for one partition, in the requested order.
    fn query_readings(
        &self,
        subject_id: &str,
        sensor: SensorKind,
        order: Order,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError>;

    /// All readings with `timestamp >= since`, optionally for one subject.
    fn readings_since(&self, subject_id: Option<&str>, since: f64) -> Result<Vec<Reading>, StoreError>;

    /// Up to `limit` of a subject's oldest readings across every sensor.
    fn subject_readings(&self, subject_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError>;
}

/// Append-only anomaly persistence.
pub trait AnomalyStore: Send + Sync {
    fn write_anomaly(&self, anomaly: &Anomaly) -> Result<i64, StoreError>;

    /// Most recent anomaly for a pair, by timestamp.
    fn query_last_anomaly(&self, subject_id: &str, sensor: SensorKind) -> Result<Option<Anomaly>, StoreError>;

    /// Most recent anomalies across all pairs, newest first.
    fn query_recent_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StoreError>;
}

/// Combined store used by the pipeline.
pub trait Store: ReadingStore + AnomalyStore {}

impl<T: ReadingStore + AnomalyStore> Store for T {}

/// Thread-safe shared store handle.
pub type SharedStore = Arc<dyn Store>;
