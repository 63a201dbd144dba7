//! SQLite-backed store.
//!
//! All writes go through one connection guarded by a mutex. Reads open their
//! own short-lived read-only connection, so they never queue behind each other
//! and, with WAL journaling, never block on the writer.

use super::{AnomalyStore, ReadingStore};
use crate::core::types::{Anomaly, Order, Reading, SensorKind};
use crate::error::StoreError;
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id TEXT NOT NULL,
    sensor TEXT NOT NULL,
    timestamp REAL NOT NULL,
    value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_readings_partition
    ON readings (subject_id, sensor, timestamp);
CREATE TABLE IF NOT EXISTS anomalies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id TEXT NOT NULL,
    sensor TEXT NOT NULL,
    timestamp REAL NOT NULL,
    value REAL NOT NULL,
    threshold REAL NOT NULL,
    window_size INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_anomalies_partition
    ON anomalies (subject_id, sensor, timestamp);
";

/// Reading and anomaly store in a single SQLite database file.
pub struct SqliteStore {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(&path)?;
        let mode: String =
            writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!("SQLite kept journal mode '{}' for {:?}", mode, path);
        }
        writer.execute_batch(SCHEMA)?;
        tracing::debug!("Opened reading store at {:?}", path);

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_connection(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    fn write<F>(&self, f: F) -> Result<i64, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<usize>,
    {
        let conn = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)?;
        Ok(conn.last_insert_rowid())
    }
}

fn parse_sensor(raw: &str) -> Result<SensorKind, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown sensor '{raw}' in store")))
}

type RawReading = (String, String, f64, f64);

fn raw_reading(row: &Row<'_>) -> rusqlite::Result<RawReading> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_reading((subject_id, sensor, timestamp, value): RawReading) -> Result<Reading, StoreError> {
    Ok(Reading {
        subject_id,
        sensor_kind: parse_sensor(&sensor)?,
        timestamp,
        value,
    })
}

type RawAnomaly = (String, String, f64, f64, f64, i64);

fn raw_anomaly(row: &Row<'_>) -> rusqlite::Result<RawAnomaly> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_anomaly(
    (subject_id, sensor, timestamp, value, threshold, window_size): RawAnomaly,
) -> Result<Anomaly, StoreError> {
    Ok(Anomaly {
        subject_id,
        sensor_kind: parse_sensor(&sensor)?,
        timestamp,
        observed_average: value,
        threshold,
        window_size: usize::try_from(window_size)
            .map_err(|_| StoreError::Corrupt(format!("negative window {window_size}")))?,
    })
}

fn collect_readings<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Reading>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, raw_reading)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(into_reading).collect()
}

fn collect_anomalies<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Anomaly>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, raw_anomaly)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(into_anomaly).collect()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl ReadingStore for SqliteStore {
    fn write_reading(&self, reading: &Reading) -> Result<i64, StoreError> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO readings (subject_id, sensor, timestamp, value) VALUES (?1, ?2, ?3, ?4)",
                params![
                    reading.subject_id,
                    reading.sensor_kind.as_str(),
                    reading.timestamp,
                    reading.value
                ],
            )
        })
    }

    fn query_readings(
        &self,
        subject_id: &str,
        sensor: SensorKind,
        order: Order,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        let sql = match order {
            Order::OldestFirst => {
                "SELECT subject_id, sensor, timestamp, value FROM readings
                 WHERE subject_id = ?1 AND sensor = ?2
                 ORDER BY timestamp ASC, id ASC LIMIT ?3"
            }
            Order::NewestFirst => {
                "SELECT subject_id, sensor, timestamp, value FROM readings
                 WHERE subject_id = ?1 AND sensor = ?2
                 ORDER BY timestamp DESC, id DESC LIMIT ?3"
            }
        };
        let conn = self.read_connection()?;
        collect_readings(&conn, sql, params![subject_id, sensor.as_str(), sql_limit(limit)])
    }

    fn readings_since(&self, subject_id: Option<&str>, since: f64) -> Result<Vec<Reading>, StoreError> {
        let conn = self.read_connection()?;
        match subject_id {
            Some(subject) => collect_readings(
                &conn,
                "SELECT subject_id, sensor, timestamp, value FROM readings
                 WHERE subject_id = ?1 AND timestamp >= ?2 ORDER BY timestamp ASC, id ASC",
                params![subject, since],
            ),
            None => collect_readings(
                &conn,
                "SELECT subject_id, sensor, timestamp, value FROM readings
                 WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC",
                params![since],
            ),
        }
    }

    fn subject_readings(&self, subject_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let conn = self.read_connection()?;
        collect_readings(
            &conn,
            "SELECT subject_id, sensor, timestamp, value FROM readings
             WHERE subject_id = ?1 ORDER BY timestamp ASC, id ASC LIMIT ?2",
            params![subject_id, sql_limit(limit)],
        )
    }
}

impl AnomalyStore for SqliteStore {
    fn write_anomaly(&self, anomaly: &Anomaly) -> Result<i64, StoreError> {
        let window = i64::try_from(anomaly.window_size).unwrap_or(i64::MAX);
        self.write(|conn| {
            conn.execute(
                "INSERT INTO anomalies (subject_id, sensor, timestamp, value, threshold, window_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    anomaly.subject_id,
                    anomaly.sensor_kind.as_str(),
                    anomaly.timestamp,
                    anomaly.observed_average,
                    anomaly.threshold,
                    window
                ],
            )
        })
    }

    fn query_last_anomaly(&self, subject_id: &str, sensor: SensorKind) -> Result<Option<Anomaly>, StoreError> {
        let conn = self.read_connection()?;
        let mut rows = collect_anomalies(
            &conn,
            "SELECT subject_id, sensor, timestamp, value, threshold, window_size FROM anomalies
             WHERE subject_id = ?1 AND sensor = ?2
             ORDER BY timestamp DESC, id DESC LIMIT 1",
            params![subject_id, sensor.as_str()],
        )?;
        Ok(rows.pop())
    }

    fn query_recent_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StoreError> {
        let conn = self.read_connection()?;
        collect_anomalies(
            &conn,
            "SELECT subject_id, sensor, timestamp, value, threshold, window_size FROM anomalies
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
            params![sql_limit(limit)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_roundtrip_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("vitals.db")).unwrap();

        let first = store
            .write_reading(&Reading::new("alice", SensorKind::Eda, 20.0, 2.0))
            .unwrap();
        let second = store
            .write_reading(&Reading::new("alice", SensorKind::Eda, 10.0, 1.0))
            .unwrap();
        assert!(second > first);

        let newest = store
            .query_readings("alice", SensorKind::Eda, Order::NewestFirst, 1)
            .unwrap();
        assert_eq!(newest, vec![Reading::new("alice", SensorKind::Eda, 20.0, 2.0)]);

        let all = store.subject_readings("alice", 100).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].timestamp, 10.0);

        assert!(store.readings_since(Some("alice"), 15.0).unwrap().len() == 1);
        assert!(store.readings_since(Some("bob"), 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_anomalies() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("nested").join("vitals.db")).unwrap();

        let anomaly = Anomaly {
            subject_id: "alice".to_string(),
            sensor_kind: SensorKind::Temp,
            timestamp: 1_700_000_000.0,
            observed_average: 39.1,
            threshold: 38.5,
            window_size: 10,
        };
        store.write_anomaly(&anomaly).unwrap();

        assert_eq!(
            store.query_last_anomaly("alice", SensorKind::Temp).unwrap(),
            Some(anomaly.clone())
        );
        assert_eq!(store.query_recent_anomalies(5).unwrap(), vec![anomaly]);
    }

    #[test]
    fn test_sqlite_negative_window_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("vitals.db")).unwrap();
        store
            .write(|conn| {
                conn.execute(
                    "INSERT INTO anomalies (subject_id, sensor, timestamp, value, threshold, window_size)
                     VALUES ('alice', 'hr', 1.0, 130.0, 120.0, -3)",
                    [],
                )
            })
            .unwrap();

        let err = store.query_last_anomaly("alice", SensorKind::Hr).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(ref msg) if msg.contains("-3")));
        assert!(store.query_recent_anomalies(5).is_err());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitals.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .write_reading(&Reading::new("alice", SensorKind::Hr, 1.0, 80.0))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.subject_readings("alice", 10).unwrap().len(), 1);
    }
}
