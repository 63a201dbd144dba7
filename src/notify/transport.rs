//! Alert delivery transports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// A composed alert, independent of how it is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject_line: String,
    pub body: String,
}

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Delivery IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recipient rejected: {0}")]
    Rejected(String),
}

/// Outbound delivery capability.
pub trait NotificationTransport: Send + Sync {
    /// Deliver one message to one recipient.
    fn deliver(&self, to: &str, message: &Notification) -> Result<(), TransportError>;
}

/// Transport that only writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleTransport;

impl NotificationTransport for ConsoleTransport {
    fn deliver(&self, to: &str, message: &Notification) -> Result<(), TransportError> {
        tracing::info!(
            to = to,
            subject = %message.subject_line,
            "Alert notification\n{}",
            message.body
        );
        Ok(())
    }
}

/// Entry written to the outbox file.
#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub to: String,
    pub queued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub message: Notification,
}

/// Transport that queues alerts as JSON lines for an external mail relay.
pub struct OutboxTransport {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutboxTransport {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
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
}

impl NotificationTransport for OutboxTransport {
    fn deliver(&self, to: &str, message: &Notification) -> Result<(), TransportError> {
        if !to.contains('@') {
            return Err(TransportError::Rejected(to.to_string()));
        }

        let entry = OutboxEntry {
            to: to.to_string(),
            queued_at: Utc::now(),
            message: message.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
