//! In-process store, used by tests and short-lived replays.

use super::{AnomalyStore, ReadingStore};
use crate::core::types::{Anomaly, Order, Reading, SensorKind};
use crate::error::StoreError;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    readings: Vec<Reading>,
    anomalies: Vec<Anomaly>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by vectors behind a single `RwLock`.
///
/// Writers take the write lock, so all writes are serialized; readers share
/// the read lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted readings.
    pub fn reading_count(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).readings.len()
    }

    /// Number of persisted anomalies.
    pub fn anomaly_count(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).anomalies.len()
    }
}

/// Stable sort by timestamp, so equal timestamps keep insertion order.
fn sort_by_timestamp<T>(items: &mut [T], key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| key(a).total_cmp(&key(b)));
}

impl ReadingStore for MemoryStore {
    fn write_reading(&self, reading: &Reading) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let id = tables.allocate_id();
        tables.readings.push(reading.clone());
        Ok(id)
    }

    fn query_readings(
        &self,
        subject_id: &str,
        sensor: SensorKind,
        order: Order,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.subject_id == subject_id && r.sensor_kind == sensor)
            .cloned()
            .collect();
        drop(tables);

        sort_by_timestamp(&mut rows, |r| r.timestamp);
        if order == Order::NewestFirst {
            rows.reverse();
        }
        rows.truncate(limit);
        Ok(rows)
    }

    fn readings_since(&self, subject_id: Option<&str>, since: f64) -> Result<Vec<Reading>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .readings
            .iter()
            .filter(|r| r.timestamp >= since)
            .filter(|r| subject_id.map_or(true, |s| r.subject_id == s))
            .cloned()
            .collect())
    }

    fn subject_readings(&self, subject_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
            .collect();
        drop(tables);

        sort_by_timestamp(&mut rows, |r| r.timestamp);
        rows.truncate(limit);
        Ok(rows)
    }
}

impl AnomalyStore for MemoryStore {
    fn write_anomaly(&self, anomaly: &Anomaly) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let id = tables.allocate_id();
        tables.anomalies.push(anomaly.clone());
        Ok(id)
    }

    fn query_last_anomaly(&self, subject_id: &str, sensor: SensorKind) -> Result<Option<Anomaly>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<&Anomaly> = tables
            .anomalies
            .iter()
            .filter(|a| a.subject_id == subject_id && a.sensor_kind == sensor)
            .collect();
        sort_by_timestamp(&mut rows, |a| a.timestamp);
        Ok(rows.last().map(|a| (*a).clone()))
    }

    fn query_recent_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows = tables.anomalies.clone();
        drop(tables);

        sort_by_timestamp(&mut rows, |a| a.timestamp);
        rows.reverse();
        rows.truncate(limit);
        Ok(rows)
    }
}
