//! Best-effort replication of persisted records to a secondary document store.
//!
//! The mirror is never authoritative. Callers log a failed replication and
//! move on; nothing is rolled back.

use crate::core::types::{Anomaly, Reading};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while replicating.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mirror serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Secondary sink for readings and anomalies.
pub trait MirrorSink: Send + Sync {
    fn replicate_reading(&self, reading: &Reading) -> Result<(), MirrorError>;
    fn replicate_anomaly(&self, anomaly: &Anomaly) -> Result<(), MirrorError>;
}

/// Mirror that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMirror;

impl MirrorSink for NoopMirror {
    fn replicate_reading(&self, _reading: &Reading) -> Result<(), MirrorError> {
        Ok(())
    }

    fn replicate_anomaly(&self, _anomaly: &Anomaly) -> Result<(), MirrorError> {
        Ok(())
    }
}

/// One replicated document.
#[derive(Debug, Serialize)]
struct MirrorDocument<'a, T: Serialize> {
    doc_id: Uuid,
    collection: &'static str,
    replicated_at: DateTime<Utc>,
    data: &'a T,
}

/// Mirror appending JSON documents, one per line, to a local file.
pub struct JsonlMirror {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlMirror {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append<T: Serialize>(&self, collection: &'static str, data: &T) -> Result<(), MirrorError> {
        let doc = MirrorDocument {
            doc_id: Uuid::new_v4(),
            collection,
            replicated_at: Utc::now(),
            data,
        };
        let mut line = serde_json::to_string(&doc)?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl MirrorSink for JsonlMirror {
    fn replicate_reading(&self, reading: &Reading) -> Result<(), MirrorError> {
        self.append("readings", reading)
    }

    fn replicate_anomaly(&self, anomaly: &Anomaly) -> Result<(), MirrorError> {
        self.append("anomalies", anomaly)
    }
}
